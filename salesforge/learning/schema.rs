use std::{collections::HashMap, fmt};

use chrono::{Duration, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::errors::SchemaError;

/// Store label column.
pub const STORE: &str = "Store";
/// Product category label column.
pub const CATEGORY: &str = "Category";
/// Units sold per record.
pub const UNITS_SOLD: &str = "Units_Sold";
/// Price per unit.
pub const UNIT_PRICE: &str = "Unit_Price";
/// Sale date.
pub const DATE: &str = "Date";
/// Derived `Units_Sold * Unit_Price`.
pub const TOTAL_SALES: &str = "Total_Sales";

/// Cell markers read as missing, compared after trimming.
pub const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-nan", "NULL", "null", "None", "<NA>", "#N/A",
];

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Free text category label.
    Label,
    /// Floating point values.
    Numeric,
    /// Calendar date, possibly null.
    Date,
    /// Boolean indicator.
    Flag,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Label => "label",
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::Flag => "flag",
        })
    }
}

/// A named, typed column of the raw schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Header name.
    pub name: &'static str,
    /// Type the column is coerced to.
    pub kind: ColumnKind,
}

/// The fixed raw schema, in canonical order.
pub const RAW_SCHEMA: [ColumnSpec; 5] = [
    ColumnSpec { name: STORE, kind: ColumnKind::Label },
    ColumnSpec { name: CATEGORY, kind: ColumnKind::Label },
    ColumnSpec { name: UNITS_SOLD, kind: ColumnKind::Numeric },
    ColumnSpec { name: UNIT_PRICE, kind: ColumnKind::Numeric },
    ColumnSpec { name: DATE, kind: ColumnKind::Date },
];

/// Normalizes a raw cell: trims it and maps missing markers to `None`.
#[must_use]
pub fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if MISSING_MARKERS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// One input row. Values are kept as text until the preprocessor coerces them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawRecord {
    /// Store label.
    pub store: Option<String>,
    /// Category label.
    pub category: Option<String>,
    /// Units sold, unparsed.
    pub units_sold: Option<String>,
    /// Unit price, unparsed.
    pub unit_price: Option<String>,
    /// Sale date, unparsed.
    pub date: Option<String>,
}

impl RawRecord {
    /// Builds a record from cells in [`RAW_SCHEMA`] order.
    #[must_use]
    pub fn from_cells(cells: [&str; 5]) -> Self {
        let [store, category, units_sold, unit_price, date] = cells.map(normalize_cell);
        Self {
            store,
            category,
            units_sold,
            unit_price,
            date,
        }
    }

    /// Cell for a schema column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        match column {
            STORE => self.store.as_deref(),
            CATEGORY => self.category.as_deref(),
            UNITS_SOLD => self.units_sold.as_deref(),
            UNIT_PRICE => self.unit_price.as_deref(),
            DATE => self.date.as_deref(),
            _ => None,
        }
    }

    fn set(&mut self, column: &str, value: Option<String>) {
        match column {
            STORE => self.store = value,
            CATEGORY => self.category = value,
            UNITS_SOLD => self.units_sold = value,
            UNIT_PRICE => self.unit_price = value,
            DATE => self.date = value,
            _ => {}
        }
    }
}

/// Rows validated against [`RAW_SCHEMA`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    records: Vec<RawRecord>,
    ignored_columns: Vec<String>,
}

impl RawDataset {
    /// Wraps already-typed records.
    #[must_use]
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            ignored_columns: Vec::new(),
        }
    }

    /// Builds a dataset from a header row and text rows.
    ///
    /// Every schema column must be present in `headers`; other columns are
    /// ignored and remembered in [`RawDataset::ignored_columns`]. Short rows
    /// read as missing trailing cells.
    pub fn from_table<H, R, C>(headers: &[H], rows: R) -> Result<Self, SchemaError>
    where
        H: AsRef<str>,
        R: IntoIterator<Item = Vec<C>>,
        C: AsRef<str>,
    {
        let positions: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_ref().trim(), idx))
            .collect();
        let mut mapping = Vec::with_capacity(RAW_SCHEMA.len());
        for spec in &RAW_SCHEMA {
            let idx = positions
                .get(spec.name)
                .copied()
                .ok_or_else(|| SchemaError::MissingRequiredColumn(spec.name.to_owned()))?;
            mapping.push((spec.name, idx));
        }
        let ignored_columns = headers
            .iter()
            .map(|name| name.as_ref().trim())
            .filter(|name| !RAW_SCHEMA.iter().any(|spec| spec.name == *name))
            .map(ToOwned::to_owned)
            .collect();

        let records = rows
            .into_iter()
            .map(|row| {
                let mut record = RawRecord::default();
                for (name, idx) in &mapping {
                    record.set(name, row.get(*idx).and_then(|cell| normalize_cell(cell.as_ref())));
                }
                record
            })
            .collect();
        Ok(Self {
            records,
            ignored_columns,
        })
    }

    /// Records in input order.
    #[must_use]
    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Input columns outside the fixed schema.
    #[must_use]
    pub fn ignored_columns(&self) -> &[String] {
        &self.ignored_columns
    }
}

impl From<Vec<RawRecord>> for RawDataset {
    fn from(records: Vec<RawRecord>) -> Self {
        Self::new(records)
    }
}

/// Deterministic synthetic sales data.
///
/// Every 20th row duplicates its predecessor; some `Units_Sold` cells are
/// missing, some `Unit_Price` cells are malformed, and some dates don't parse.
#[must_use]
pub fn synthetic_sales(rows: usize, seed: u64) -> RawDataset {
    const STORES: [&str; 4] = ["North", "South", "East", "West"];
    const CATEGORIES: [(&str, f64); 3] = [("Electronics", 120.0), ("Grocery", 4.5), ("Toys", 22.0)];

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default();
    let mut records: Vec<RawRecord> = Vec::with_capacity(rows);
    for idx in 0..rows {
        if idx % 20 == 19 {
            if let Some(previous) = records.last().cloned() {
                records.push(previous);
                continue;
            }
        }
        let store = STORES[rng.gen_range(0..STORES.len())];
        let (category, base_price) = CATEGORIES[rng.gen_range(0..CATEGORIES.len())];
        let units: u32 = rng.gen_range(1..60);
        let price = base_price * rng.gen_range(0.8..1.2);
        let date = start + Duration::days(i64::try_from(idx).unwrap_or(i64::MAX) % 365);

        let units = if idx % 17 == 3 { String::new() } else { units.to_string() };
        let price = if idx % 23 == 5 { "n.a.".to_owned() } else { format!("{price:.2}") };
        let date = if idx % 29 == 7 {
            "31/31/2023".to_owned()
        } else {
            date.format("%Y-%m-%d").to_string()
        };
        records.push(RawRecord::from_cells([store, category, &units, &price, &date]));
    }
    RawDataset::new(records)
}
