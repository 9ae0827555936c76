use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::core::types::{DocId, DocIndex, Rank, MAX_RANK};
use crate::index::row_id::RowId;

/// One rank's bit matrix within a slice: `total_row_count(rank)` rows,
/// row-major, each row `slice_capacity >> rank` bits wide. Row R starts at
/// word `R * words_per_row`.
///
/// Because `slice_capacity` is a power of two `>= 64 << MAX_RANK`,
/// `bits_per_row` is always an exact multiple of 64 for every rank in
/// `0..=MAX_RANK`, so no row ever splits a word across a rank boundary —
/// this is what lets the matcher mix ranks by reading a single word per
/// rank per position (see `rank0_equivalent_word`).
pub struct RankBuffer {
    words: Vec<AtomicU64>,
    words_per_row: u32,
}

impl RankBuffer {
    fn new(rows: u32, bits_per_row: u32) -> Self {
        let words_per_row = bits_per_row.div_ceil(64);
        let total_words = rows as usize * words_per_row as usize;
        let words = (0..total_words).map(|_| AtomicU64::new(0)).collect();
        RankBuffer { words, words_per_row }
    }

    fn index_of(&self, row: u32, doc_index_at_rank: u32) -> (usize, u32) {
        let word_in_row = doc_index_at_rank / 64;
        let bit = doc_index_at_rank % 64;
        (row as usize * self.words_per_row as usize + word_in_row as usize, bit)
    }

    pub fn set_bit(&self, row: u32, doc_index: u32, rank: u8) {
        let (word_idx, bit) = self.index_of(row, doc_index >> rank);
        self.words[word_idx].fetch_or(1u64 << bit, Ordering::AcqRel);
    }

    pub fn clear_bit(&self, row: u32, doc_index: u32, rank: u8) {
        let (word_idx, bit) = self.index_of(row, doc_index >> rank);
        self.words[word_idx].fetch_and(!(1u64 << bit), Ordering::AcqRel);
    }

    pub fn word(&self, row: u32, word_pos: u32) -> u64 {
        self.words[row as usize * self.words_per_row as usize + word_pos as usize].load(Ordering::Acquire)
    }

    pub fn words_per_row(&self) -> u32 {
        self.words_per_row
    }

    /// Fills an entire row with all-one bits. Used once, at slice creation,
    /// to initialize the physically-stored `MatchAll` row — the single row
    /// whose bits are always set regardless of which columns are active.
    fn fill_row_ones(&self, row: u32) {
        for w in 0..self.words_per_row {
            self.words[row as usize * self.words_per_row as usize + w as usize].store(u64::MAX, Ordering::Release);
        }
    }

    /// The physical word index within `row` that rank-0 position
    /// `rank0_word_pos` reads from, at `rank`. For `rank == 0` this is
    /// `rank0_word_pos` itself; for `rank > 0`, `2^rank` consecutive rank-0
    /// positions share the same underlying word, since one stored bit
    /// covers `2^rank` documents. Used both by `rank0_equivalent_word` to
    /// perform the actual read and by the cache-line counting mode to dedupe
    /// repeated reads of the same word.
    pub fn word_index_for(&self, rank: u8, rank0_word_pos: u32) -> u32 {
        if rank == 0 {
            return rank0_word_pos;
        }
        let start_bit = (rank0_word_pos as u64 * 64) >> rank;
        (start_bit / 64) as u32
    }

    /// The rank-0 word an arbitrary-rank row contributes at rank-0 word
    /// position `rank0_word_pos`. For `rank == 0` this is a direct word
    /// read; for `rank > 0`, each stored bit covers `2^rank` consecutive
    /// documents, so the `64 >> rank` relevant bits are read once and each
    /// expanded into `2^rank` output bits.
    pub fn rank0_equivalent_word(&self, rank: u8, row: u32, rank0_word_pos: u32) -> u64 {
        if rank == 0 {
            return self.word(row, rank0_word_pos);
        }

        let groups = 64u32 >> rank; // distinct rank-r bits spanned by one rank-0 word
        let start_bit = (rank0_word_pos as u64 * 64) >> rank;
        let word_index = self.word_index_for(rank, rank0_word_pos);
        let bit_offset = (start_bit % 64) as u32;

        let raw = self.word(row, word_index);
        let mask: u64 = if groups >= 64 { u64::MAX } else { (1u64 << groups) - 1 };
        let bits = (raw >> bit_offset) & mask;

        if rank >= MAX_RANK {
            return if bits & 1 == 1 { u64::MAX } else { 0 };
        }

        let group_width = 1u64 << rank; // docs per source bit
        let mut result = 0u64;
        for g in 0..groups {
            if (bits >> g) & 1 == 1 {
                let shift = g * group_width as u32;
                let group_mask: u64 = if group_width >= 64 { u64::MAX } else { (1u64 << group_width) - 1 };
                result |= group_mask << shift;
            }
        }
        result
    }
}

/// A fixed-capacity, power-of-two-sized column range within a shard. Owns
/// one `RankBuffer` per rank actually used by the shard's `TermTable`, plus
/// the `DocIndex -> DocId` mapping for result resolution.
///
/// Slices never move once created; a shard's slice list is an append-only
/// arena and a slice's `slice_index` is its position in that arena — this
/// is the safe-Rust shape of the spec's "shard-relative slice index"
/// redesign, replacing a raw back-pointer with a plain index the matcher
/// resolves through the owning `Shard`.
pub struct Slice {
    pub slice_index: u32,
    pub capacity: u32,
    next_doc_index: AtomicU32,
    sealed: AtomicBool,
    buffers: Vec<Option<RankBuffer>>,
    doc_ids: Vec<AtomicU64>,
}

/// Sentinel stored in `doc_ids` for a column that has not yet been
/// allocated.
const UNALLOCATED: u64 = u64::MAX;

impl Slice {
    pub fn new(slice_index: u32, capacity: u32, rows_per_rank: &[u32; MAX_RANK as usize + 1], match_all_row: RowId) -> Self {
        assert!(capacity.is_power_of_two(), "slice capacity must be a power of two");
        let buffers: Vec<Option<RankBuffer>> = (0..=MAX_RANK)
            .map(|rank| {
                let rows = rows_per_rank[rank as usize];
                if rows == 0 {
                    None
                } else {
                    Some(RankBuffer::new(rows, capacity >> rank))
                }
            })
            .collect();

        let slice = Slice {
            slice_index,
            capacity,
            next_doc_index: AtomicU32::new(0),
            sealed: AtomicBool::new(false),
            buffers,
            doc_ids: (0..capacity).map(|_| AtomicU64::new(UNALLOCATED)).collect(),
        };

        if match_all_row.rank.0 == 0 {
            if let Some(buf) = slice.buffers[0].as_ref() {
                buf.fill_row_ones(match_all_row.index);
            }
        }
        slice
    }

    /// Lock-free reservation of the next column. Returns `None` once the
    /// slice is at capacity; the caller (under the shard's structural lock)
    /// then seals this slice and allocates a new one.
    pub fn try_reserve(&self) -> Option<DocIndex> {
        loop {
            let current = self.next_doc_index.load(Ordering::Acquire);
            if current >= self.capacity {
                return None;
            }
            if self
                .next_doc_index
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(DocIndex(current));
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.next_doc_index.load(Ordering::Acquire) >= self.capacity
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn allocated_len(&self) -> u32 {
        self.next_doc_index.load(Ordering::Acquire).min(self.capacity)
    }

    pub fn rank_buffer(&self, rank: Rank) -> &RankBuffer {
        self.buffers[rank.0 as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("rank {} has no rows configured for this shard", rank.0))
    }

    pub fn set_row(&self, row: RowId, doc_index: DocIndex) {
        self.rank_buffer(row.rank).set_bit(row.index, doc_index.0, row.rank.0);
    }

    pub fn register_doc_id(&self, doc_index: DocIndex, doc_id: DocId) {
        let previous = self.doc_ids[doc_index.0 as usize].swap(doc_id.0, Ordering::AcqRel);
        assert_eq!(previous, UNALLOCATED, "duplicate DocId registration at the same column");
    }

    pub fn doc_id_at(&self, doc_index: u32) -> Option<DocId> {
        let raw = self.doc_ids[doc_index as usize].load(Ordering::Acquire);
        if raw == UNALLOCATED {
            None
        } else {
            Some(DocId(raw))
        }
    }
}
