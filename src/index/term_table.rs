use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Rank, RowIndex, MAX_RANK};
use crate::index::row_id::{PackedRowIdSequence, RowId, RowIdSequenceKind};
use crate::index::term::{hash_variant, Term, DOCUMENT_ACTIVE_HASH, MATCH_ALL_HASH, MATCH_NONE_HASH};

/// Build-time state for one in-progress explicit or adhoc term.
struct OpenTerm {
    rows: Vec<RowId>,
    is_adhoc: bool,
}

/// Builds a `TermTable` through the Open/Add/Close protocol described in the
/// spec: explicit terms via `open_term`/`add_row_id`/`close_term`, adhoc
/// recipes via `open_adhoc_term`/`add_row_id`/`close_adhoc_term`, then row
/// counts and fact count, then `seal`.
///
/// Reopening a term, or closing one twice, is a build-time contract
/// violation and panics rather than returning an error — the spec lists
/// this among the conditions that are fatal, not recoverable.
pub struct TermTableBuilder {
    explicit_rows: Vec<RowId>,
    explicit_index: HashMap<u64, PackedRowIdSequence>,
    adhoc_recipes: Vec<Rank>,
    adhoc_index: HashMap<(u16, u8), PackedRowIdSequence>,
    fact_terms: HashMap<u64, PackedRowIdSequence>,
    explicit_count: [u32; MAX_RANK as usize + 1],
    adhoc_count: [u32; MAX_RANK as usize + 1],
    user_fact_count: u32,
    open: Option<OpenTerm>,
}

impl TermTableBuilder {
    pub fn new() -> Self {
        let mut builder = TermTableBuilder {
            explicit_rows: Vec::new(),
            explicit_index: HashMap::new(),
            adhoc_recipes: Vec::new(),
            adhoc_index: HashMap::new(),
            fact_terms: HashMap::new(),
            explicit_count: [0; MAX_RANK as usize + 1],
            adhoc_count: [0; MAX_RANK as usize + 1],
            user_fact_count: 0,
            open: None,
        };
        builder.register_system_terms();
        builder
    }

    /// Reserves the three process-wide system terms: `MatchAll` and
    /// `MatchNone` as dedicated explicit rank-0 rows, `DocumentActive` as
    /// fact row 0. The reserved fact row always exists even before
    /// `set_fact_count` is called, since `seal` adds it to whatever user
    /// fact count is configured.
    fn register_system_terms(&mut self) {
        self.open_term();
        self.add_row_id(Rank::new(0), 0);
        self.close_term(MATCH_ALL_HASH);

        self.open_term();
        self.add_row_id(Rank::new(0), 1);
        self.close_term(MATCH_NONE_HASH);

        self.fact_terms
            .insert(DOCUMENT_ACTIVE_HASH, PackedRowIdSequence::new(RowIdSequenceKind::Fact, 0, 1));
    }

    pub fn open_term(&mut self) {
        assert!(self.open.is_none(), "OpenTerm called while a term is already open");
        self.open = Some(OpenTerm { rows: Vec::new(), is_adhoc: false });
    }

    pub fn open_adhoc_term(&mut self) {
        assert!(self.open.is_none(), "OpenTerm called while a term is already open");
        self.open = Some(OpenTerm { rows: Vec::new(), is_adhoc: true });
    }

    /// Appends one row to the currently open term. `rel_idx` is a relative
    /// index within `rank`'s band, supplied by the caller — assigning which
    /// row a term owns is the job of the external statistics/training tool
    /// this core does not implement; the builder only records and validates
    /// the protocol.
    pub fn add_row_id(&mut self, rank: Rank, rel_idx: RowIndex) {
        let open = self.open.as_mut().expect("AddRowId called with no term open");
        open.rows.push(RowId::new(rank, rel_idx));
    }

    pub fn close_term(&mut self, hash: u64) {
        let open = self.open.take().expect("CloseTerm called with no term open");
        assert!(!open.is_adhoc, "CloseTerm called on a term opened with OpenAdhocTerm");
        assert!(
            !self.explicit_index.contains_key(&hash),
            "duplicate CloseTerm for hash {hash}"
        );
        let start = self.explicit_rows.len() as u32;
        let count = open.rows.len() as u32;
        self.explicit_rows.extend(open.rows);
        self.explicit_index
            .insert(hash, PackedRowIdSequence::new(RowIdSequenceKind::Explicit, start, count));
    }

    /// Closes an adhoc recipe. Adhoc rows carry only a rank (the concrete
    /// row index is synthesized per document at read time); `idf_x10` and
    /// `gram_size` are the bucket key future terms resolve against.
    pub fn close_adhoc_term(&mut self, idf_x10: u16, gram_size: u8) {
        let open = self.open.take().expect("CloseAdhocTerm called with no term open");
        assert!(open.is_adhoc, "CloseAdhocTerm called on a term opened with OpenTerm");
        let key = (idf_x10, gram_size);
        assert!(
            !self.adhoc_index.contains_key(&key),
            "duplicate CloseAdhocTerm for bucket {key:?}"
        );
        let start = self.adhoc_recipes.len() as u32;
        let count = open.rows.len() as u32;
        self.adhoc_recipes.extend(open.rows.into_iter().map(|r| r.rank));
        self.adhoc_index
            .insert(key, PackedRowIdSequence::new(RowIdSequenceKind::Adhoc, start, count));
    }

    pub fn set_row_counts(&mut self, rank: Rank, explicit_count: u32, adhoc_count: u32) {
        self.explicit_count[rank.0 as usize] = explicit_count;
        self.adhoc_count[rank.0 as usize] = adhoc_count;
    }

    /// `fact_count` is the number of *user-defined* fact rows; the reserved
    /// `DocumentActive` row at rank-0 fact index 0 is always present on top
    /// of this.
    pub fn set_fact_count(&mut self, fact_count: u32) {
        self.user_fact_count = fact_count;
    }

    /// Converts relative indices to absolute and freezes the table.
    /// Explicit rows are offset by 0 (already absolute within their rank's
    /// band); adhoc rows are offset by `explicit_count(rank)` at read time;
    /// fact rows sit at the top of rank 0, above both explicit and adhoc
    /// rank-0 rows.
    pub fn seal(self) -> TermTable {
        for (rank, &count) in self.explicit_count.iter().enumerate() {
            if count > 0 {
                let max_seen = self
                    .explicit_rows
                    .iter()
                    .filter(|r| r.rank.0 as usize == rank)
                    .map(|r| r.index + 1)
                    .max()
                    .unwrap_or(0);
                assert!(
                    max_seen <= count,
                    "explicit row count {count} at rank {rank} too small for index {max_seen}"
                );
            }
        }

        TermTable {
            explicit_rows: self.explicit_rows,
            explicit_index: self.explicit_index,
            adhoc_recipes: self.adhoc_recipes,
            adhoc_index: self.adhoc_index,
            fact_terms: self.fact_terms,
            fact_count: self.user_fact_count + 1,
            explicit_count: self.explicit_count,
            adhoc_count: self.adhoc_count,
        }
    }
}

impl Default for TermTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sealed, read-only term-to-row mapping for one shard. Shared (via `Arc`)
/// between the ingestor, every slice's matcher, and query planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermTable {
    explicit_rows: Vec<RowId>,
    explicit_index: HashMap<u64, PackedRowIdSequence>,
    adhoc_recipes: Vec<Rank>,
    adhoc_index: HashMap<(u16, u8), PackedRowIdSequence>,
    fact_terms: HashMap<u64, PackedRowIdSequence>,
    fact_count: u32,
    explicit_count: [u32; MAX_RANK as usize + 1],
    adhoc_count: [u32; MAX_RANK as usize + 1],
}

impl TermTable {
    /// Looks up the packed sequence for a term: an explicit match if the
    /// term's exact hash was registered, otherwise the adhoc recipe for its
    /// `(idf_x10, gram_size)` bucket, otherwise an empty sequence. An
    /// unknown term is not an error — it simply never matches.
    pub fn get_rows(&self, term: &Term) -> PackedRowIdSequence {
        if let Some(seq) = self.fact_terms.get(&term.hash) {
            return *seq;
        }
        if let Some(seq) = self.explicit_index.get(&term.hash) {
            return *seq;
        }
        self.adhoc_index
            .get(&(term.idf_x10, term.gram_size))
            .copied()
            .unwrap_or(PackedRowIdSequence::EMPTY)
    }

    pub fn get_row_id_explicit(&self, index: u32) -> RowId {
        self.explicit_rows[index as usize]
    }

    pub fn get_row_id_fact(&self, rel_index: u32) -> RowId {
        let rank0 = Rank::new(0);
        RowId::new(rank0, self.explicit_count[0] + self.adhoc_count[0] + rel_index)
    }

    /// Synthesizes the concrete row for an adhoc term. `slot_index` selects
    /// which of the recipe's rows to resolve (a recipe may name more than
    /// one rank); `variant` is that slot's 0-based position in the recipe,
    /// used to vary the hash so different slots probe different rows.
    pub fn get_row_id_adhoc(&self, hash: u64, slot_index: u32, variant: u32) -> RowId {
        let rank = self.adhoc_recipes[slot_index as usize];
        let modulus = self.adhoc_count[rank.0 as usize];
        assert!(modulus > 0, "adhoc rank {} has zero configured rows", rank.0);
        let rel = (hash_variant(hash, variant) % modulus as u64) as u32;
        RowId::new(rank, self.explicit_count[rank.0 as usize] + rel)
    }

    /// Expands a term into its concrete rows, dispatching on the sequence's
    /// kind. Every row in the result must be AND-ed together for the term
    /// to be considered present (bloom-filter semantics: false positives
    /// are possible, false negatives are not).
    pub fn resolve(&self, term: &Term) -> Vec<RowId> {
        let seq = self.get_rows(term);
        match seq.kind() {
            RowIdSequenceKind::Explicit if !seq.is_empty() => {
                (seq.start()..seq.start() + seq.count())
                    .map(|i| self.get_row_id_explicit(i))
                    .collect()
            }
            RowIdSequenceKind::Fact if !seq.is_empty() => {
                (0..seq.count())
                    .map(|i| self.get_row_id_fact(seq.start() + i))
                    .collect()
            }
            RowIdSequenceKind::Adhoc if !seq.is_empty() => (0..seq.count())
                .map(|variant| self.get_row_id_adhoc(term.hash, seq.start() + variant, variant))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn document_active_row(&self) -> RowId {
        self.get_row_id_fact(0)
    }

    pub fn match_all_row(&self) -> RowId {
        self.explicit_rows[self.explicit_index[&MATCH_ALL_HASH].start() as usize]
    }

    pub fn match_none_row(&self) -> RowId {
        self.explicit_rows[self.explicit_index[&MATCH_NONE_HASH].start() as usize]
    }

    pub fn is_rank_used(&self, rank: Rank) -> bool {
        self.get_total_row_count(rank) > 0
    }

    pub fn get_max_rank_used(&self) -> Rank {
        (0..=MAX_RANK)
            .rev()
            .find(|&r| self.is_rank_used(Rank::new(r)))
            .map(Rank::new)
            .unwrap_or(Rank::new(0))
    }

    pub fn get_total_row_count(&self, rank: Rank) -> u32 {
        let base = self.explicit_count[rank.0 as usize] + self.adhoc_count[rank.0 as usize];
        if rank.0 == 0 {
            base + self.fact_count
        } else {
            base
        }
    }

    /// Average bytes of bit-matrix storage a single document costs at this
    /// rank: one bit per row, amortized over the `2^rank` documents a
    /// rank-r bit covers.
    pub fn get_bytes_per_document(&self, rank: Rank) -> f64 {
        let rows = self.get_total_row_count(rank) as f64;
        rows / 8.0 / rank.docs_per_bit() as f64
    }

    /// Serializes with a 4-byte little-endian CRC32 header over the
    /// bincode payload, so a truncated or bit-flipped artifact on disk is
    /// caught at load time instead of producing a `TermTable` with
    /// corrupted row geometry.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self).map_err(Error::from)?;
        let checksum = crc32fast::hash(&payload);
        let mut out = Vec::with_capacity(4 + payload.len());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::new(ErrorKind::Parse, "artifact shorter than its checksum header"));
        }
        let (header, payload) = bytes.split_at(4);
        let expected = u32::from_le_bytes(header.try_into().unwrap());
        let actual = crc32fast::hash(payload);
        if expected != actual {
            return Err(Error::new(
                ErrorKind::Parse,
                format!("TermTable artifact checksum mismatch: expected {expected}, got {actual}"),
            ));
        }
        bincode::deserialize(payload).map_err(|e| Error::new(ErrorKind::Parse, format!("malformed TermTable artifact: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_simple_table() -> TermTable {
        let mut b = TermTableBuilder::new();
        // One explicit unigram term at rank 0, index 2 (0 and 1 reserved).
        b.open_term();
        b.add_row_id(Rank::new(0), 2);
        b.close_term(999);

        b.open_adhoc_term();
        b.add_row_id(Rank::new(0), 0);
        b.add_row_id(Rank::new(0), 0);
        b.close_adhoc_term(10, 1);

        b.set_row_counts(Rank::new(0), 3, 50);
        for r in 1..=MAX_RANK {
            b.set_row_counts(Rank::new(r), 0, 0);
        }
        b.set_fact_count(0);
        b.seal()
    }

    #[test]
    fn explicit_term_resolves_to_registered_row() {
        let table = build_simple_table();
        let term = Term { hash: 999, stream_id: 0, gram_size: 1, idf_x10: 0 };
        let rows = table.resolve(&term);
        assert_eq!(rows, vec![RowId::new(Rank::new(0), 2)]);
    }

    #[test]
    fn unknown_term_resolves_empty_not_error() {
        let table = build_simple_table();
        let term = Term { hash: 424242, stream_id: 0, gram_size: 7, idf_x10: 999 };
        assert!(table.resolve(&term).is_empty());
    }

    #[test]
    fn adhoc_term_resolves_within_bounds() {
        let table = build_simple_table();
        let term = Term { hash: 55555, stream_id: 0, gram_size: 1, idf_x10: 10 };
        let rows = table.resolve(&term);
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.rank, Rank::new(0));
            assert!(row.index >= 3 && row.index < 53);
        }
    }

    #[test]
    fn system_terms_are_reserved() {
        let table = build_simple_table();
        assert_eq!(table.match_all_row(), RowId::new(Rank::new(0), 0));
        assert_eq!(table.match_none_row(), RowId::new(Rank::new(0), 1));
        assert_eq!(table.document_active_row().rank, Rank::new(0));
    }

    #[test]
    fn bytes_round_trip() {
        let table = build_simple_table();
        let bytes = table.to_bytes().unwrap();
        let restored = TermTable::from_bytes(&bytes).unwrap();
        let term = Term { hash: 999, stream_id: 0, gram_size: 1, idf_x10: 0 };
        assert_eq!(table.resolve(&term), restored.resolve(&term));
    }

    #[test]
    fn corrupted_artifact_fails_the_checksum() {
        let table = build_simple_table();
        let mut bytes = table.to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = TermTable::from_bytes(&bytes).unwrap_err();
        assert!(format!("{err}").contains("checksum"));
    }

    #[test]
    #[should_panic]
    fn duplicate_close_term_is_fatal() {
        let mut b = TermTableBuilder::new();
        b.open_term();
        b.close_term(42);
        b.open_term();
        b.close_term(42);
    }
}
