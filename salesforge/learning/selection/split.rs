use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed used for the train/test shuffle unless configured otherwise.
pub const DEFAULT_SEED: u64 = 42;

/// Row indices of a train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Training rows.
    pub train: Vec<usize>,
    /// Held-out rows.
    pub test: Vec<usize>,
}

/// Shuffles `0..rows` with a seeded generator and holds out
/// `ceil(test_ratio * rows)` of them.
///
/// The same `(rows, test_ratio, seed)` always yields the same partition.
#[must_use]
pub fn shuffle_split(rows: usize, test_ratio: f64, seed: u64) -> Partition {
    let mut order: Vec<usize> = (0..rows).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let n_test = test_size(rows, test_ratio);
    let train = order.split_off(n_test);
    Partition { train, test: order }
}

fn test_size(rows: usize, test_ratio: f64) -> usize {
    // tolerance keeps products like 0.2 * 100 from rounding up to 21
    let raw = test_ratio.clamp(0.0, 1.0).mul_add(rows as f64, -1e-9).ceil().max(0.0) as usize;
    raw.min(rows)
}

/// Contiguous, unshuffled k-fold partitions of `0..rows`.
///
/// The first `rows % k` folds hold one extra row. Every row lands in exactly
/// one validation fold.
#[must_use]
pub fn k_fold(rows: usize, k: usize) -> Vec<Partition> {
    let k = k.max(1);
    let base = rows / k;
    let extra = rows % k;
    let mut start = 0;
    (0..k)
        .map(|fold| {
            let size = base + usize::from(fold < extra);
            let end = start + size;
            let partition = Partition {
                train: (0..start).chain(end..rows).collect(),
                test: (start..end).collect(),
            };
            start = end;
            partition
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_holds_out_ceiling_of_ratio() {
        let partition = shuffle_split(101, 0.2, DEFAULT_SEED);
        assert_eq!(partition.test.len(), 21);
        assert_eq!(partition.train.len(), 80);
        let mut all: Vec<usize> = partition.train.iter().chain(&partition.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..101).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_reproducible_per_seed() {
        assert_eq!(shuffle_split(50, 0.2, 7), shuffle_split(50, 0.2, 7));
        assert_ne!(shuffle_split(50, 0.2, 7), shuffle_split(50, 0.2, 8));
    }

    #[test]
    fn folds_cover_every_row_once() {
        let folds = k_fold(12, 5);
        let sizes: Vec<usize> = folds.iter().map(|fold| fold.test.len()).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2, 2]);
        let mut seen: Vec<usize> = folds.iter().flat_map(|fold| fold.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 12);
            assert!(fold.train.iter().all(|row| !fold.test.contains(row)));
        }
    }
}
