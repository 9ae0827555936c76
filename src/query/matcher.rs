use std::collections::HashSet;

use rayon::prelude::*;
use roaring::RoaringBitmap;

use crate::core::types::DocId;
use crate::query::planner::Plan;
use crate::simd::WordOps;
use crate::storage::Shard;

/// Word-at-a-time evaluator: walks every rank-0 word position across every
/// slice in a shard, folding the plan's rows together with bitwise AND/OR
/// and expanding higher-rank rows down to rank-0 granularity so mixed-rank
/// plans combine in a single pass.
pub struct Matcher;

/// Cache-line traffic reported by `execute_counting`, the "cache-line
/// counting mode" research benchmarks use to compare plan shapes. Counts
/// distinct `(rank, row, word_index)` triples actually read across the
/// whole shard — not one count per rank-0 word position visited, since a
/// rank > 0 row's same underlying word backs up to `2^rank` consecutive
/// rank-0 positions and reading it 2^rank times is still one cache line.
/// Zero runtime cost when not requested: `execute` never builds this set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MatchStats {
    pub distinct_cache_lines_read: u64,
}

impl Matcher {
    /// Runs `plan` against every slice of `shard`, in parallel across
    /// slices, and returns the matching document ids in ascending
    /// (slice-order, docIndex) order — `rayon`'s indexed `flat_map` keeps
    /// `slices_snapshot`'s append order, and each slice's `RoaringBitmap`
    /// iterates its set bits ascending.
    pub fn execute(shard: &Shard, plan: &Plan) -> Vec<DocId> {
        let slices = shard.slices_snapshot();
        slices
            .par_iter()
            .flat_map(|slice| Self::run_slice(slice, plan))
            .collect()
    }

    /// Identical to `execute`, but also reports the number of distinct
    /// cache lines read — each slice tracks its own touched-word set
    /// (never shared across slices, since different slices never share
    /// underlying memory) and the per-slice counts are summed at the end.
    pub fn execute_counting(shard: &Shard, plan: &Plan) -> (Vec<DocId>, MatchStats) {
        let slices = shard.slices_snapshot();
        let per_slice: Vec<(Vec<DocId>, u64)> = slices
            .par_iter()
            .map(|slice| {
                let mut touched = HashSet::new();
                let docs = Self::run_slice_counting(slice, plan, &mut touched);
                (docs, touched.len() as u64)
            })
            .collect();

        let mut docs = Vec::new();
        let mut distinct_cache_lines_read = 0u64;
        for (slice_docs, count) in per_slice {
            docs.extend(slice_docs);
            distinct_cache_lines_read += count;
        }
        (docs, MatchStats { distinct_cache_lines_read })
    }

    fn run_slice(slice: &crate::storage::Slice, plan: &Plan) -> Vec<DocId> {
        let words_per_row = slice.rank_buffer(crate::core::types::Rank::new(0)).words_per_row();
        let mut bitmap = RoaringBitmap::new();
        for word_pos in 0..words_per_row {
            Self::collect_word(plan, slice, word_pos, &mut bitmap);
        }
        bitmap.iter().filter_map(|doc_index| slice.doc_id_at(doc_index)).collect()
    }

    fn run_slice_counting(
        slice: &crate::storage::Slice,
        plan: &Plan,
        touched: &mut HashSet<(u8, u32, u32)>,
    ) -> Vec<DocId> {
        let words_per_row = slice.rank_buffer(crate::core::types::Rank::new(0)).words_per_row();
        let mut bitmap = RoaringBitmap::new();
        for word_pos in 0..words_per_row {
            let word = Self::evaluate_counting(plan, slice, word_pos, touched);
            Self::fold_word_into(word, word_pos, slice.capacity, &mut bitmap);
        }
        bitmap.iter().filter_map(|doc_index| slice.doc_id_at(doc_index)).collect()
    }

    fn collect_word(plan: &Plan, slice: &crate::storage::Slice, word_pos: u32, bitmap: &mut RoaringBitmap) {
        let word = Self::evaluate(plan, slice, word_pos);
        Self::fold_word_into(word, word_pos, slice.capacity, bitmap);
    }

    fn fold_word_into(word: u64, word_pos: u32, capacity: u32, bitmap: &mut RoaringBitmap) {
        if word == 0 {
            return;
        }
        for bit in 0..64u32 {
            if (word >> bit) & 1 == 1 {
                let doc_index = word_pos * 64 + bit;
                if doc_index < capacity {
                    bitmap.insert(doc_index);
                }
            }
        }
    }

    fn evaluate(plan: &Plan, slice: &crate::storage::Slice, rank0_word_pos: u32) -> u64 {
        match plan {
            Plan::Row(row) => slice.rank_buffer(row.rank).rank0_equivalent_word(row.rank.0, row.index, rank0_word_pos),
            Plan::And(children) => {
                children.iter().map(|c| Self::evaluate(c, slice, rank0_word_pos)).fold(u64::MAX, WordOps::and)
            }
            Plan::Or(children) => {
                children.iter().map(|c| Self::evaluate(c, slice, rank0_word_pos)).fold(0, WordOps::or)
            }
            Plan::Not(inner) => !Self::evaluate(inner, slice, rank0_word_pos),
            Plan::AndNot(required, excluded) => {
                let req = required.iter().map(|c| Self::evaluate(c, slice, rank0_word_pos)).fold(u64::MAX, WordOps::and);
                let exc = excluded.iter().map(|c| Self::evaluate(c, slice, rank0_word_pos)).fold(0, WordOps::or);
                WordOps::and_not(req, exc)
            }
        }
    }

    fn evaluate_counting(
        plan: &Plan,
        slice: &crate::storage::Slice,
        rank0_word_pos: u32,
        touched: &mut HashSet<(u8, u32, u32)>,
    ) -> u64 {
        match plan {
            Plan::Row(row) => {
                let buffer = slice.rank_buffer(row.rank);
                let word_index = buffer.word_index_for(row.rank.0, rank0_word_pos);
                touched.insert((row.rank.0, row.index, word_index));
                buffer.rank0_equivalent_word(row.rank.0, row.index, rank0_word_pos)
            }
            Plan::And(children) => children
                .iter()
                .map(|c| Self::evaluate_counting(c, slice, rank0_word_pos, touched))
                .fold(u64::MAX, WordOps::and),
            Plan::Or(children) => children
                .iter()
                .map(|c| Self::evaluate_counting(c, slice, rank0_word_pos, touched))
                .fold(0, WordOps::or),
            Plan::Not(inner) => !Self::evaluate_counting(inner, slice, rank0_word_pos, touched),
            Plan::AndNot(required, excluded) => {
                let req = required
                    .iter()
                    .map(|c| Self::evaluate_counting(c, slice, rank0_word_pos, touched))
                    .fold(u64::MAX, WordOps::and);
                let exc = excluded
                    .iter()
                    .map(|c| Self::evaluate_counting(c, slice, rank0_word_pos, touched))
                    .fold(0, WordOps::or);
                WordOps::and_not(req, exc)
            }
        }
    }
}
