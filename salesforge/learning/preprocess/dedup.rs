use std::collections::HashSet;

use crate::schema::RawRecord;

/// Drops exact duplicate rows, keeping the first occurrence in input order.
///
/// Cells are compared after trimming, so `"A "` and `"A"` match. Missing cells
/// compare equal to each other. Returns the surviving rows and
/// the number removed.
#[must_use]
pub fn deduplicate(records: &[RawRecord]) -> (Vec<RawRecord>, usize) {
    let mut seen = HashSet::with_capacity(records.len());
    let kept: Vec<RawRecord> = records
        .iter()
        .filter(|record| seen.insert(*record))
        .cloned()
        .collect();
    let removed = records.len() - kept.len();
    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_occurrence_in_order() {
        let a = RawRecord::from_cells(["A", "X", "1", "1", ""]);
        let b = RawRecord::from_cells(["B", "X", "2", "1", ""]);
        let (kept, removed) = deduplicate(&[a.clone(), a.clone(), b.clone()]);
        assert_eq!(kept, vec![a, b]);
        assert_eq!(removed, 1);
    }

    #[test]
    fn missing_cells_count_as_equal() {
        let row = RawRecord::from_cells(["A", "", "NaN", "2", ""]);
        let (kept, removed) = deduplicate(&[row.clone(), row]);
        assert_eq!(kept.len(), 1);
        assert_eq!(removed, 1);
    }

    #[test]
    fn near_duplicates_survive() {
        let a = RawRecord::from_cells(["A", "X", "1", "1.0", ""]);
        let b = RawRecord::from_cells(["A", "X", "1", "1.00", ""]);
        assert_eq!(deduplicate(&[a, b]).1, 0);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let a = RawRecord::from_cells(["A ", "X", "1", "1", ""]);
        let b = RawRecord::from_cells(["A", " X", "1", "1", ""]);
        let (kept, removed) = deduplicate(&[a, b]);
        assert_eq!(removed, 1);
        assert_eq!(kept[0].store.as_deref(), Some("A"));
    }
}
