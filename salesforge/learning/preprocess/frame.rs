use chrono::NaiveDate;
use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{errors::SchemaError, schema::ColumnKind};

/// Values of one cleaned column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    /// Floating point values; never NaN after cleaning.
    Numeric(Vec<f64>),
    /// One-hot indicators.
    Flag(Vec<bool>),
    /// Parsed dates; `None` marks an unparseable input.
    Date(Vec<Option<NaiveDate>>),
}

impl ColumnData {
    /// Storage type.
    #[must_use]
    pub const fn kind(&self) -> ColumnKind {
        match self {
            Self::Numeric(_) => ColumnKind::Numeric,
            Self::Flag(_) => ColumnKind::Flag,
            Self::Date(_) => ColumnKind::Date,
        }
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(values) => values.len(),
            Self::Flag(values) => values.len(),
            Self::Date(values) => values.len(),
        }
    }

    /// `true` when the column has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `row` as a model input; flags map to 0/1, dates have none.
    #[must_use]
    pub fn as_f64(&self, row: usize) -> Option<f64> {
        match self {
            Self::Numeric(values) => values.get(row).copied(),
            Self::Flag(values) => values.get(row).map(|&flag| if flag { 1.0 } else { 0.0 }),
            Self::Date(_) => None,
        }
    }
}

/// Feature matrix and target vector extracted from a [`CleanedDataset`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    /// Feature column names, in matrix column order.
    pub features: Vec<String>,
    /// Target column name.
    pub target: String,
    /// `rows x features` inputs.
    pub x: Array2<f64>,
    /// Target values.
    pub y: Array1<f64>,
}

/// Ordered, typed columns of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanedDataset {
    columns: IndexMap<String, ColumnData>,
    rows: usize,
}

impl CleanedDataset {
    /// Empty frame; the first pushed column fixes the row count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        data: ColumnData,
    ) -> Result<(), SchemaError> {
        let name = name.into();
        if self.columns.contains_key(&name) {
            return Err(SchemaError::DuplicateColumn(name));
        }
        if self.columns.is_empty() {
            self.rows = data.len();
        } else if data.len() != self.rows {
            return Err(SchemaError::ColumnLength {
                column: name,
                expected: self.rows,
                found: data.len(),
            });
        }
        self.columns.insert(name, data);
        Ok(())
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows
    }

    /// `true` when the frame has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.keys().map(String::as_str)
    }

    /// `(name, data)` pairs in order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnData)> + '_ {
        self.columns.iter().map(|(name, data)| (name.as_str(), data))
    }

    /// Looks up a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.get(name)
    }

    /// Numeric column values, or a typed error.
    pub fn numeric(&self, name: &str) -> Result<&[f64], SchemaError> {
        match self.columns.get(name) {
            Some(ColumnData::Numeric(values)) => Ok(values),
            Some(other) => Err(wrong_type(name, ColumnKind::Numeric, other.kind())),
            None => Err(SchemaError::MissingRequiredColumn(name.to_owned())),
        }
    }

    /// Flag column values, or a typed error.
    pub fn flags(&self, name: &str) -> Result<&[bool], SchemaError> {
        match self.columns.get(name) {
            Some(ColumnData::Flag(values)) => Ok(values),
            Some(other) => Err(wrong_type(name, ColumnKind::Flag, other.kind())),
            None => Err(SchemaError::MissingRequiredColumn(name.to_owned())),
        }
    }

    /// Date column values, or a typed error.
    pub fn dates(&self, name: &str) -> Result<&[Option<NaiveDate>], SchemaError> {
        match self.columns.get(name) {
            Some(ColumnData::Date(values)) => Ok(values),
            Some(other) => Err(wrong_type(name, ColumnKind::Date, other.kind())),
            None => Err(SchemaError::MissingRequiredColumn(name.to_owned())),
        }
    }

    pub(crate) fn numeric_mut(&mut self, name: &str) -> Result<&mut Vec<f64>, SchemaError> {
        match self.columns.get_mut(name) {
            Some(ColumnData::Numeric(values)) => Ok(values),
            Some(other) => Err(wrong_type(name, ColumnKind::Numeric, other.kind())),
            None => Err(SchemaError::MissingRequiredColumn(name.to_owned())),
        }
    }

    /// Splits the frame into features and target.
    ///
    /// Features are every column except `target` and `excluded`, in frame
    /// order. Excluded names that don't exist are ignored. Date columns can't
    /// be features and must be excluded.
    pub fn feature_matrix(
        &self,
        target: &str,
        excluded: &[String],
    ) -> Result<FeatureMatrix, SchemaError> {
        let y = Array1::from(self.numeric(target)?.to_vec());
        let features: Vec<String> = self
            .columns
            .keys()
            .filter(|name| name.as_str() != target && !excluded.contains(name))
            .cloned()
            .collect();
        if features.is_empty() {
            return Err(SchemaError::NoFeatureColumns(target.to_owned()));
        }
        let x = self.select_matrix(&features)?;
        Ok(FeatureMatrix {
            features,
            target: target.to_owned(),
            x,
            y,
        })
    }

    /// Builds a `rows x features.len()` matrix from the named columns.
    pub fn select_matrix(&self, features: &[String]) -> Result<Array2<f64>, SchemaError> {
        let columns = features
            .iter()
            .map(|name| match self.columns.get(name) {
                Some(ColumnData::Date(_)) => {
                    Err(wrong_type(name, ColumnKind::Numeric, ColumnKind::Date))
                }
                Some(data) => Ok(data),
                None => Err(SchemaError::MissingRequiredColumn(name.clone())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Array2::from_shape_fn((self.rows, columns.len()), |(row, col)| {
            columns[col].as_f64(row).unwrap_or_default()
        }))
    }
}

fn wrong_type(column: &str, expected: ColumnKind, found: ColumnKind) -> SchemaError {
    SchemaError::WrongColumnType {
        column: column.to_owned(),
        expected,
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> CleanedDataset {
        let mut frame = CleanedDataset::new();
        frame
            .push_column("Units_Sold", ColumnData::Numeric(vec![1.0, 2.0, 3.0]))
            .unwrap();
        frame
            .push_column("Date", ColumnData::Date(vec![None, None, None]))
            .unwrap();
        frame
            .push_column("Store_B", ColumnData::Flag(vec![false, true, true]))
            .unwrap();
        frame
            .push_column("Total_Sales", ColumnData::Numeric(vec![10.0, 20.0, 30.0]))
            .unwrap();
        frame
    }

    #[test]
    fn feature_matrix_skips_target_and_exclusions() {
        let matrix = frame()
            .feature_matrix("Total_Sales", &["Date".to_owned()])
            .unwrap();
        assert_eq!(matrix.features, vec!["Units_Sold", "Store_B"]);
        assert_eq!(matrix.x.dim(), (3, 2));
        assert_eq!(matrix.x[[1, 1]], 1.0);
        assert_eq!(matrix.y[2], 30.0);
    }

    #[test]
    fn date_features_are_rejected() {
        let err = frame().feature_matrix("Total_Sales", &[]).unwrap_err();
        assert!(matches!(err, SchemaError::WrongColumnType { found: ColumnKind::Date, .. }));
    }

    #[test]
    fn push_column_checks_length() {
        let mut frame = frame();
        let err = frame
            .push_column("Unit_Price", ColumnData::Numeric(vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::ColumnLength { expected: 3, found: 1, .. }));
    }

    #[test]
    fn missing_target_is_a_schema_error() {
        let err = frame().feature_matrix("Revenue", &[]).unwrap_err();
        assert_eq!(err, SchemaError::MissingRequiredColumn("Revenue".into()));
    }
}
