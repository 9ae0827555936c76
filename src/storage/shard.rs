use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::types::{DocIndex, ShardId, MAX_RANK};
use crate::index::term_table::TermTable;
use crate::storage::slice::Slice;

/// One shard's append-only arena of slices, all sharing the shard's
/// `TermTable` geometry. A shard owns every `Slice` it ever creates;
/// `Arc<Slice>` handles let in-flight readers keep a slice alive after a
/// newer slice becomes the active write target.
pub struct Shard {
    pub shard_id: ShardId,
    pub term_table: Arc<TermTable>,
    capacity: u32,
    rows_per_rank: [u32; MAX_RANK as usize + 1],
    slices: RwLock<Vec<Arc<Slice>>>,
    current: AtomicU32,
}

impl Shard {
    pub fn new(shard_id: ShardId, term_table: Arc<TermTable>, capacity: u32) -> Self {
        let mut rows_per_rank = [0u32; MAX_RANK as usize + 1];
        for rank in 0..=MAX_RANK {
            rows_per_rank[rank as usize] =
                term_table.get_total_row_count(crate::core::types::Rank::new(rank));
        }

        let first = Arc::new(Slice::new(0, capacity, &rows_per_rank, term_table.document_active_row()));
        Shard {
            shard_id,
            term_table,
            capacity,
            rows_per_rank,
            slices: RwLock::new(vec![first]),
            current: AtomicU32::new(0),
        }
    }

    /// Reserves a fresh column for a new document, sealing the current
    /// slice and appending a new one if it is full. The fast path (current
    /// slice has room) takes only a read lock and one CAS; the slow path
    /// (slice rollover) takes the write lock once per rollover, not once per
    /// document.
    pub fn allocate_doc_index(&self) -> (Arc<Slice>, DocIndex) {
        loop {
            let current_idx = self.current.load(Ordering::Acquire);
            let candidate = {
                let slices = self.slices.read();
                slices[current_idx as usize].clone()
            };

            if let Some(doc_index) = candidate.try_reserve() {
                return (candidate, doc_index);
            }

            let mut slices = self.slices.write();
            if self.current.load(Ordering::Acquire) != current_idx {
                // Another writer already rolled the slice over; retry.
                continue;
            }
            candidate.seal();
            let new_index = slices.len() as u32;
            let new_slice = Arc::new(Slice::new(
                new_index,
                self.capacity,
                &self.rows_per_rank,
                self.term_table.document_active_row(),
            ));
            slices.push(new_slice);
            self.current.store(new_index, Ordering::Release);
        }
    }

    pub fn slice(&self, slice_index: u32) -> Arc<Slice> {
        self.slices.read()[slice_index as usize].clone()
    }

    pub fn slice_count(&self) -> usize {
        self.slices.read().len()
    }

    /// Snapshot of every slice currently in the arena, in creation order.
    /// Used by the matcher to scan the whole shard and by the recycler to
    /// find candidates for reclamation.
    pub fn slices_snapshot(&self) -> Vec<Arc<Slice>> {
        self.slices.read().clone()
    }

    pub fn document_count(&self) -> u64 {
        self.slices
            .read()
            .iter()
            .map(|s| s.allocated_len() as u64)
            .sum()
    }
}
