use crate::record::{Key, Observation, ResolvedRecord};
use indexmap::IndexMap;
use serde::Serialize;

/// (barcode, read count) groups observed under one `Key`
pub type BarcodeCounts = Vec<(String, u64)>;

/// Groups observations by (cell ID, UMI, barcode), keeping the order in which each `Key` and
/// barcode was first seen.
///
/// A pre-counted table keeps every observation as its own group instead, since each row already
/// carries the final count of its sequence. Repeated rows then compete with each other.
#[derive(Default, Debug)]
pub struct ConsensusTable {
    pub by_key: IndexMap<Key, BarcodeCounts>,
    pre_counted: bool,
}

/// How many (cell ID, UMI, barcode) combinations were removed at each resolution step.
#[derive(Serialize, Copy, Clone, Debug, Default, PartialEq)]
pub struct ResolutionStats {
    /// distinct (cell ID, UMI, barcode) combinations
    pub combinations: usize,
    /// combinations with fewer reads than the best barcode of their key
    pub removed_not_max: usize,
    pub kept_max: usize,
    /// combinations sharing the maximum count of their key with another barcode
    pub removed_ties: usize,
    pub kept: usize,
}

impl ConsensusTable {
    pub fn new() -> Self {
        ConsensusTable::default()
    }

    pub fn pre_counted() -> Self {
        ConsensusTable {
            pre_counted: true,
            ..ConsensusTable::default()
        }
    }

    /// Adds the reads of `observation` to its (cell ID, UMI, barcode) group.
    pub fn insert(&mut self, observation: Observation) {
        let groups = self.by_key.entry(observation.key).or_default();

        if !self.pre_counted {
            if let Some((_, count)) = groups.iter_mut().find(|(b, _)| *b == observation.barcode) {
                *count = count.saturating_add(observation.count);
                return;
            }
        }

        groups.push((observation.barcode, observation.count));
    }

    pub fn keys(&self) -> usize {
        self.by_key.len()
    }

    pub fn combinations(&self) -> usize {
        self.by_key.values().map(|barcodes| barcodes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Resolves every `Key` to its best supported barcode.
    ///
    /// All barcodes with the maximum count of their key are kept first; a key is then dropped
    /// entirely if more than one barcode remains. Ties are never broken arbitrarily.
    ///
    /// Records are returned in the order their key was first inserted.
    pub fn resolve(self) -> (Vec<ResolvedRecord>, ResolutionStats) {
        let mut stats = ResolutionStats::default();
        let mut resolved = Vec::with_capacity(self.by_key.len());
        let mut tied_keys = 0usize;

        for (key, barcodes) in self.by_key {
            stats.combinations += barcodes.len();

            let Some(max_count) = barcodes.iter().map(|(_, count)| *count).max() else {
                continue;
            };

            let mut at_max: Vec<(String, u64)> = barcodes
                .into_iter()
                .filter(|(_, count)| *count == max_count)
                .collect();

            stats.kept_max += at_max.len();

            if at_max.len() == 1 {
                let (barcode, count) = at_max.swap_remove(0);
                resolved.push(ResolvedRecord {
                    key,
                    barcode,
                    count,
                });
            } else {
                stats.removed_ties += at_max.len();
                tied_keys += 1;
            }
        }

        stats.removed_not_max = stats.combinations - stats.kept_max;
        stats.kept = resolved.len();

        debug!(
            "Resolved {} keys, dropped {} keys with tied barcodes",
            stats.kept, tied_keys
        );

        (resolved, stats)
    }
}

impl Extend<Observation> for ConsensusTable {
    fn extend<T: IntoIterator<Item = Observation>>(&mut self, iter: T) {
        for observation in iter {
            self.insert(observation);
        }
    }
}

impl FromIterator<Observation> for ConsensusTable {
    fn from_iter<T: IntoIterator<Item = Observation>>(iter: T) -> Self {
        let mut table = ConsensusTable::new();
        table.extend(iter);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(cell_id: &str, umi: &str, barcode: &str, count: u64) -> Observation {
        Observation {
            key: Key::new(cell_id, umi),
            barcode: barcode.to_string(),
            count,
        }
    }

    fn repeat(o: Observation, n: usize) -> impl Iterator<Item = Observation> {
        std::iter::repeat(o).take(n)
    }

    #[test]
    fn aggregates_identical_triples() {
        let table: ConsensusTable = repeat(obs("C1", "U1", "BC1", 1), 3)
            .chain(repeat(obs("C1", "U1", "BC2", 1), 1))
            .collect();

        assert_eq!(table.keys(), 1);
        assert_eq!(table.combinations(), 2);
        assert_eq!(
            table.by_key[&Key::new("C1", "U1")],
            vec![("BC1".to_string(), 3), ("BC2".to_string(), 1)]
        );
    }

    #[test]
    fn majority_barcode_wins() {
        let table: ConsensusTable = repeat(obs("C1", "U1", "BC1", 1), 3)
            .chain(repeat(obs("C1", "U1", "BC2", 1), 1))
            .collect();

        let (resolved, stats) = table.resolve();
        assert_eq!(
            resolved,
            vec![ResolvedRecord {
                key: Key::new("C1", "U1"),
                barcode: "BC1".to_string(),
                count: 3
            }]
        );
        assert_eq!(
            stats,
            ResolutionStats {
                combinations: 2,
                removed_not_max: 1,
                kept_max: 1,
                removed_ties: 0,
                kept: 1
            }
        );
    }

    #[test]
    fn ties_drop_the_key() {
        let table: ConsensusTable = repeat(obs("C2", "U2", "BCa", 1), 2)
            .chain(repeat(obs("C2", "U2", "BCb", 1), 2))
            .collect();

        let (resolved, stats) = table.resolve();
        assert!(resolved.is_empty());
        assert_eq!(stats.kept_max, 2);
        assert_eq!(stats.removed_ties, 2);
        assert_eq!(stats.kept, 0);
    }

    #[test]
    fn tie_below_the_maximum_is_kept() {
        let table: ConsensusTable = vec![
            obs("C1", "U1", "BC1", 5),
            obs("C1", "U1", "BC2", 2),
            obs("C1", "U1", "BC3", 2),
        ]
        .into_iter()
        .collect();

        let (resolved, stats) = table.resolve();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].barcode, "BC1");
        assert_eq!(stats.removed_not_max, 2);
        assert_eq!(stats.removed_ties, 0);
    }

    #[test]
    fn same_count_under_different_keys_is_not_a_tie() {
        let table: ConsensusTable = vec![
            obs("AAAA", "GGG", "TTTT", 5),
            obs("CCCC", "GGG", "AAAA", 5),
        ]
        .into_iter()
        .collect();

        let (resolved, stats) = table.resolve();
        assert_eq!(resolved.len(), 2);
        assert_eq!(stats.removed_ties, 0);
    }

    fn pre_counted_table(observations: Vec<Observation>) -> ConsensusTable {
        let mut table = ConsensusTable::pre_counted();
        table.extend(observations);
        table
    }

    #[test]
    fn pre_counted_rows_are_not_summed() {
        let table = pre_counted_table(vec![
            obs("AAAA", "CC", "GG", 2),
            obs("AAAA", "CC", "TT", 3),
            obs("AAAA", "CC", "GG", 2),
        ]);
        assert_eq!(table.combinations(), 3);

        let (resolved, stats) = table.resolve();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].barcode, "TT");
        assert_eq!(resolved[0].count, 3);
        assert_eq!(stats.removed_not_max, 2);
    }

    #[test]
    fn repeated_pre_counted_row_ties_with_itself() {
        let table = pre_counted_table(vec![
            obs("AAAA", "CC", "GG", 3),
            obs("AAAA", "CC", "TT", 2),
            obs("AAAA", "CC", "GG", 3),
        ]);

        let (resolved, stats) = table.resolve();
        assert!(resolved.is_empty());
        assert_eq!(stats.kept_max, 2);
        assert_eq!(stats.removed_ties, 2);
    }

    #[test]
    fn aggregated_counts_saturate() {
        let table: ConsensusTable = vec![obs("C1", "U1", "BC1", u64::MAX), obs("C1", "U1", "BC1", 1)]
            .into_iter()
            .collect();

        let (resolved, _) = table.resolve();
        assert_eq!(resolved[0].count, u64::MAX);
    }

    #[test]
    fn keys_resolve_in_first_seen_order() {
        let table: ConsensusTable = vec![
            obs("C3", "U1", "BC1", 1),
            obs("C1", "U1", "BC1", 1),
            obs("C2", "U1", "BC1", 1),
            obs("C1", "U1", "BC1", 1),
        ]
        .into_iter()
        .collect();

        let (resolved, _) = table.resolve();
        let cells: Vec<&str> = resolved.iter().map(|r| r.key.cell_id.as_str()).collect();
        assert_eq!(cells, vec!["C3", "C1", "C2"]);
    }

    #[test]
    fn winner_strictly_exceeds_every_other_barcode() {
        let observations = vec![
            obs("C1", "U1", "A", 4),
            obs("C1", "U1", "B", 3),
            obs("C1", "U2", "A", 1),
            obs("C1", "U2", "B", 1),
            obs("C2", "U1", "C", 2),
            obs("C2", "U1", "C", 1),
            obs("C2", "U1", "D", 2),
        ];
        let table: ConsensusTable = observations.iter().cloned().collect();
        let (resolved, _) = table.resolve();

        for record in &resolved {
            let others = observations
                .iter()
                .filter(|o| o.key == record.key && o.barcode != record.barcode);
            for other in others {
                assert!(record.count > other.count);
            }
        }
        let keys: Vec<&Key> = resolved.iter().map(|r| &r.key).collect();
        assert_eq!(keys, vec![&Key::new("C1", "U1"), &Key::new("C2", "U1")]);
    }

    #[test]
    fn empty_table() {
        let (resolved, stats) = ConsensusTable::new().resolve();
        assert!(resolved.is_empty());
        assert_eq!(stats, ResolutionStats::default());
    }
}
