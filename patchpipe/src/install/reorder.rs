//! Per-repository reorder buffer.
//!
//! Transfers complete in arbitrary order; installs within a repository must
//! run oldest-to-newest. The buffer holds out-of-order results and releases
//! each repository's results in contiguous `sequence_index` order, starting
//! at 0. Repositories are independent: a slow transfer in one never holds
//! back releases in another.

use std::collections::{BTreeMap, HashMap};

use crate::transfer::TransferResult;

#[derive(Debug, Default)]
pub(crate) struct ReorderBuffer {
    /// Out-of-order results waiting for their predecessors, per repository.
    pending: HashMap<String, BTreeMap<usize, TransferResult>>,
    /// Next sequence index to release, per repository.
    cursors: HashMap<String, usize>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one completed transfer and release every result that is now
    /// in order, oldest first.
    pub fn accept(&mut self, result: TransferResult) -> Vec<TransferResult> {
        let repository = result.descriptor.repository.clone();
        self.pending
            .entry(repository.clone())
            .or_default()
            .insert(result.descriptor.sequence_index, result);

        let cursor = self.cursors.entry(repository.clone()).or_insert(0);
        let mut released = Vec::new();
        if let Some(queue) = self.pending.get_mut(&repository) {
            while let Some(next) = queue.remove(cursor) {
                released.push(next);
                *cursor += 1;
            }
        }
        released
    }

    /// Number of results still held back by missing predecessors.
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PatchDescriptor;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn result(repository: &str, sequence_index: usize) -> TransferResult {
        TransferResult {
            descriptor: PatchDescriptor {
                repository: repository.to_string(),
                file_name: format!("{sequence_index}.patch"),
                source_url: format!("mock://{repository}/{sequence_index}.patch"),
                expected_size: 1,
                target_version: format!("{repository}-{sequence_index}"),
                sequence_index,
                expected_sha256: None,
            },
            staging_path: PathBuf::from(format!("{repository}/{sequence_index}.patch")),
            bytes_written: 1,
            error: None,
        }
    }

    #[test]
    fn test_in_order_results_release_immediately() {
        let mut buffer = ReorderBuffer::new();
        assert_eq!(buffer.accept(result("game", 0)).len(), 1);
        assert_eq!(buffer.accept(result("game", 1)).len(), 1);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_out_of_order_result_is_held_until_predecessor_arrives() {
        let mut buffer = ReorderBuffer::new();

        // Index 2 and 1 arrive first; nothing can be released.
        assert!(buffer.accept(result("game", 2)).is_empty());
        assert!(buffer.accept(result("game", 1)).is_empty());
        assert_eq!(buffer.pending_len(), 2);

        // Index 0 unblocks the whole chain at once.
        let released = buffer.accept(result("game", 0));
        let indices: Vec<_> = released
            .iter()
            .map(|r| r.descriptor.sequence_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_repositories_are_independent() {
        let mut buffer = ReorderBuffer::new();

        // game is blocked on index 0, boot is not.
        assert!(buffer.accept(result("game", 1)).is_empty());
        let released = buffer.accept(result("boot", 0));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].descriptor.repository, "boot");
        assert_eq!(buffer.pending_len(), 1);
    }

    proptest! {
        /// Any arrival order releases every result, and each repository's
        /// release order is ascending by sequence index.
        #[test]
        fn test_any_arrival_order_releases_all_in_repo_order(
            game_len in 0usize..8,
            boot_len in 0usize..8,
            seed in any::<u64>(),
        ) {
            let mut arrivals: Vec<TransferResult> = (0..game_len)
                .map(|i| result("game", i))
                .chain((0..boot_len).map(|i| result("boot", i)))
                .collect();

            // Deterministic shuffle from the seed.
            let mut state = seed | 1;
            for i in (1..arrivals.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                arrivals.swap(i, (state as usize) % (i + 1));
            }

            let mut buffer = ReorderBuffer::new();
            let mut released: HashMap<String, Vec<usize>> = HashMap::new();
            for arrival in arrivals {
                for r in buffer.accept(arrival) {
                    released
                        .entry(r.descriptor.repository.clone())
                        .or_default()
                        .push(r.descriptor.sequence_index);
                }
            }

            prop_assert_eq!(buffer.pending_len(), 0);
            let game = released.remove("game").unwrap_or_default();
            let boot = released.remove("boot").unwrap_or_default();
            prop_assert_eq!(game, (0..game_len).collect::<Vec<_>>());
            prop_assert_eq!(boot, (0..boot_len).collect::<Vec<_>>());
        }
    }
}
