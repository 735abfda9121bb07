use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Dummy encoding of one categorical column.
///
/// Levels are sorted lexically; the smallest becomes the dropped reference
/// level and every other level gets a `<column>_<level>` indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalLevels {
    column: String,
    reference: Option<String>,
    levels: Vec<String>,
}

/// Indicator columns produced by [`CategoricalLevels::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedColumns {
    /// `(indicator name, values)` in level order.
    pub indicators: Vec<(String, Vec<bool>)>,
    /// Non-missing labels never seen at fit time.
    pub unknown: usize,
}

impl CategoricalLevels {
    /// Collects the distinct non-missing labels of `values`.
    pub fn fit<'a>(column: impl Into<String>, values: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        let distinct: BTreeSet<&str> = values.into_iter().flatten().collect();
        let mut levels = distinct.into_iter().map(ToOwned::to_owned);
        let reference = levels.next();
        Self {
            column: column.into(),
            reference,
            levels: levels.collect(),
        }
    }

    /// Source column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Dropped reference level.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Levels with an indicator column.
    #[must_use]
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Indicator column names.
    #[must_use]
    pub fn indicator_names(&self) -> Vec<String> {
        self.levels
            .iter()
            .map(|level| format!("{}_{level}", self.column))
            .collect()
    }

    /// Expands `values` into indicator columns.
    ///
    /// The reference level, missing labels and unknown labels all encode as
    /// an all-false row.
    pub fn encode<'a>(&self, values: impl IntoIterator<Item = Option<&'a str>>) -> EncodedColumns {
        let values: Vec<Option<&str>> = values.into_iter().collect();
        let unknown = values
            .iter()
            .flatten()
            .filter(|&&label| {
                self.reference.as_deref() != Some(label)
                    && !self.levels.iter().any(|level| level == label)
            })
            .count();
        let indicators = self
            .levels
            .iter()
            .zip(self.indicator_names())
            .map(|(level, name)| {
                let flags = values
                    .iter()
                    .map(|value| *value == Some(level.as_str()))
                    .collect();
                (name, flags)
            })
            .collect();
        EncodedColumns { indicators, unknown }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_lexically_first_level() {
        let values = [Some("Y"), Some("X"), Some("Z"), Some("X")];
        let levels = CategoricalLevels::fit("Store", values);
        assert_eq!(levels.reference(), Some("X"));
        assert_eq!(levels.indicator_names(), vec!["Store_Y", "Store_Z"]);

        let encoded = levels.encode(values);
        assert_eq!(encoded.indicators[0].1, vec![true, false, false, false]);
        assert_eq!(encoded.indicators[1].1, vec![false, false, true, false]);
        assert_eq!(encoded.unknown, 0);
    }

    #[test]
    fn unknown_and_missing_labels_are_all_false() {
        let levels = CategoricalLevels::fit("Category", [Some("Food"), Some("Toys")]);
        let encoded = levels.encode([Some("Garden"), None, Some("Toys")]);
        assert_eq!(encoded.indicators.len(), 1);
        assert_eq!(encoded.indicators[0].1, vec![false, false, true]);
        assert_eq!(encoded.unknown, 1);
    }

    #[test]
    fn single_level_yields_no_indicators() {
        let levels = CategoricalLevels::fit("Store", [Some("Only"), None]);
        assert!(levels.indicator_names().is_empty());
        assert!(levels.encode([Some("Only")]).indicators.is_empty());
    }
}
