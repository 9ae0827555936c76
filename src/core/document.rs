use std::collections::HashSet;

use crate::core::types::{DocId, StreamId};
use crate::index::term::{sliding_window_terms, Term};

/// Accumulates postings for one document before it is closed and handed to
/// the Ingestor. A single pass over each stream's token sequence: for a
/// configured max gram size `K`, every window of `1..=K` consecutive tokens
/// starting at position `i` is emitted (forward-only — reversed sequences
/// are intentionally not matched, per the ingestion front-end's design).
///
/// Duplicate `(stream, hash)` postings collapse to one entry (set
/// semantics): repeating a word in a document does not multiply its row
/// writes.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    seen: HashSet<(StreamId, u64)>,
    terms: Vec<Term>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        DocumentBuilder::default()
    }

    /// Ingests one stream's already-tokenized content. `idf_of` supplies the
    /// `IdfX10` bucket for a single token; composed n-grams sum their
    /// component unigrams' buckets (saturating), per `Term::compose`.
    pub fn add_stream(
        &mut self,
        stream_id: StreamId,
        tokens: &[&str],
        max_gram_size: u8,
        idf_of: impl Fn(&str) -> u16,
    ) {
        for term in sliding_window_terms(stream_id, tokens, max_gram_size, &idf_of) {
            self.record(term);
        }
    }

    fn record(&mut self, term: Term) {
        if self.seen.insert((term.stream_id, term.hash)) {
            self.terms.push(term);
        }
    }

    /// Closes the document under an externally assigned `DocId`. Only at
    /// close does the ingestor write bits and activate the document's
    /// column; a `DocumentBuilder` that is dropped without closing leaves no
    /// trace in the index.
    pub fn close(self, doc_id: DocId) -> Document {
        Document {
            doc_id,
            postings: self.seen,
            terms: self.terms,
        }
    }
}

/// A closed document: its distinct postings and the ordered term list used
/// to drive bit-matrix writes during ingestion.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: DocId,
    postings: HashSet<(StreamId, u64)>,
    pub terms: Vec<Term>,
}

impl Document {
    /// Used only by the verification path (spec's soundness property):
    /// true iff this document's posting set contains the exact
    /// `(stream_id, raw_hash)` pair, independent of row-table geometry.
    pub fn contains(&self, stream_id: StreamId, hash: u64) -> bool {
        self.postings.contains(&(stream_id, hash))
    }
}
