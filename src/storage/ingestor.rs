use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::config::Config;
use crate::core::document::Document;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{IngestorStats, ShardStats};
use crate::core::types::{DocId, ShardId};
use crate::index::term_table::TermTable;
use crate::memory::Recycler;
use crate::mvcc::TokenManager;
use crate::query::{Ast, Matcher, QueryPlanner};
use crate::storage::shard::Shard;

/// Where a live document's columns are: which shard, which slice within
/// that shard's arena, and the column inside that slice. Held in the
/// registry so deletes and re-ingests can find a document's old location
/// without scanning.
#[derive(Debug, Clone, Copy)]
struct DocLocation {
    shard_id: ShardId,
    slice_index: u32,
    doc_index: u32,
}

/// Orchestrates ingestion across a fixed set of shards, each with its own
/// `TermTable` (shards may partition by source, tenant, or any other axis
/// the deployment chooses — this core is agnostic to the partitioning
/// policy, only to its mechanics).
///
/// A document is written in two steps, matching the "publication fence"
/// invariant: every term row is set first, and the shard's reserved
/// `DocumentActive` row is set last — so a concurrent reader can never
/// observe a partially-written, but already-active, document.
pub struct Ingestor {
    config: Config,
    shards: Vec<Shard>,
    registry: RwLock<HashMap<DocId, DocLocation>>,
    token_manager: TokenManager,
    recycler: Recycler,
    start_time: chrono::DateTime<chrono::Utc>,
}

impl Ingestor {
    pub fn new(config: Config, term_tables: Vec<Arc<TermTable>>) -> Self {
        assert!(!term_tables.is_empty(), "an ingestor needs at least one shard");
        let shards = term_tables
            .into_iter()
            .enumerate()
            .map(|(i, table)| Shard::new(ShardId(i as u16), table, config.slice_capacity))
            .collect();
        let recycler = Recycler::new(config.worker_queue_capacity);

        Ingestor {
            config,
            shards,
            registry: RwLock::new(HashMap::new()),
            token_manager: TokenManager::new(),
            recycler,
            start_time: chrono::Utc::now(),
        }
    }

    /// Writes `document` into the shard selected by `shard_of`, a pure
    /// function of the `DocId` (e.g. a modulus over shard count) — picking
    /// the actual partitioning scheme is a deployment decision this core
    /// does not make for the caller.
    pub fn add_document(&self, document: Document, shard_id: ShardId) -> Result<()> {
        if self.registry.read().contains_key(&document.doc_id) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("document {:?} is already ingested", document.doc_id),
            ));
        }

        let shard = self
            .shards
            .get(shard_id.value() as usize)
            .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, format!("no such shard {}", shard_id.value())))?;

        let (slice, doc_index) = shard.allocate_doc_index();
        slice.register_doc_id(doc_index, document.doc_id);

        for term in &document.terms {
            for row in shard.term_table.resolve(term) {
                slice.set_row(row, doc_index);
            }
        }

        // Publication fence: once this row is visible, the document is live.
        slice.set_row(shard.term_table.document_active_row(), doc_index);

        self.registry.write().insert(
            document.doc_id,
            DocLocation { shard_id, slice_index: slice.slice_index, doc_index: doc_index.0 },
        );
        Ok(())
    }

    /// Soft-deletes a document by clearing its `DocumentActive` bit. The
    /// column's storage is not reclaimed — only whole slices are, once
    /// every document in them has been superseded — but the document
    /// immediately stops matching any query.
    pub fn delete_document(&self, doc_id: DocId) -> Result<()> {
        let location = *self
            .registry
            .read()
            .get(&doc_id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("no such document {doc_id:?}")))?;

        let shard = &self.shards[location.shard_id.value() as usize];
        let slice = shard.slice(location.slice_index);
        slice.rank_buffer(crate::core::types::Rank::new(0)).clear_bit(
            shard.term_table.document_active_row().index,
            location.doc_index,
            0,
        );
        Ok(())
    }

    /// Runs `ast` against every shard, in `ShardId` order, concatenating
    /// each shard's matches. Each shard plans independently against its own
    /// `TermTable` — shards need not share row geometry — but within a
    /// shard the matcher already emits ascending (slice-order, docIndex)
    /// results, so the concatenation alone satisfies the required ordering.
    pub fn query(&self, ast: &Ast) -> Vec<DocId> {
        let mut results = Vec::new();
        for shard in &self.shards {
            let plan = QueryPlanner::new(&shard.term_table, self.config.max_gram_size).plan(ast);
            results.extend(Matcher::execute(shard, &plan));
        }
        results
    }

    pub fn shard(&self, shard_id: ShardId) -> &Shard {
        &self.shards[shard_id.value() as usize]
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.token_manager
    }

    pub fn recycler(&self) -> &Recycler {
        &self.recycler
    }

    pub fn stats(&self) -> IngestorStats {
        let shards: Vec<ShardStats> = self
            .shards
            .iter()
            .map(|shard| ShardStats {
                shard_id: shard.shard_id.value(),
                slice_count: shard.slice_count(),
                documents: shard.document_count(),
                max_rank_used: shard.term_table.get_max_rank_used().value(),
            })
            .collect();

        IngestorStats {
            start_time: self.start_time,
            shard_count: self.shards.len(),
            total_documents: shards.iter().map(|s| s.documents).sum(),
            shards,
            recycler: self.recycler.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::DocumentBuilder;
    use crate::core::types::{Rank, MAX_RANK};
    use crate::index::term::Term;
    use crate::index::term_table::TermTableBuilder;
    use crate::query::ast::Ast;

    fn table_with_term(text: &str) -> Arc<TermTable> {
        let term = Term::from_text(text, 0, 10);
        let mut b = TermTableBuilder::new();
        b.open_term();
        b.add_row_id(Rank::new(0), 2);
        b.close_term(term.hash);
        b.set_row_counts(Rank::new(0), 3, 0);
        for r in 1..=MAX_RANK {
            b.set_row_counts(Rank::new(r), 0, 0);
        }
        b.set_fact_count(0);
        Arc::new(b.seal())
    }

    #[test]
    fn add_document_registers_location_and_sets_active_row() {
        let config = Config { slice_capacity: 64, ..Config::default() };
        let ingestor = Ingestor::new(config, vec![table_with_term("alpha")]);

        let mut builder = DocumentBuilder::new();
        builder.add_stream(0, &["alpha", "beta"], 1, |_| 10);
        let doc = builder.close(DocId::new(1));

        ingestor.add_document(doc, ShardId(0)).unwrap();
        assert_eq!(ingestor.stats().total_documents, 1);
    }

    #[test]
    fn duplicate_doc_id_is_rejected() {
        let config = Config { slice_capacity: 64, ..Config::default() };
        let ingestor = Ingestor::new(config, vec![table_with_term("alpha")]);

        let mut b1 = DocumentBuilder::new();
        b1.add_stream(0, &["alpha"], 1, |_| 10);
        ingestor.add_document(b1.close(DocId::new(1)), ShardId(0)).unwrap();

        let mut b2 = DocumentBuilder::new();
        b2.add_stream(0, &["beta"], 1, |_| 10);
        assert!(ingestor.add_document(b2.close(DocId::new(1)), ShardId(0)).is_err());
    }

    #[test]
    fn delete_document_clears_active_bit() {
        let config = Config { slice_capacity: 64, ..Config::default() };
        let ingestor = Ingestor::new(config, vec![table_with_term("alpha")]);

        let mut builder = DocumentBuilder::new();
        builder.add_stream(0, &["alpha"], 1, |_| 10);
        ingestor.add_document(builder.close(DocId::new(1)), ShardId(0)).unwrap();

        ingestor.delete_document(DocId::new(1)).unwrap();

        let shard = ingestor.shard(ShardId(0));
        let slice = shard.slice(0);
        let active_row = shard.term_table.document_active_row();
        let word = slice.rank_buffer(Rank::new(0)).word(active_row.index, 0);
        assert_eq!(word & 1, 0);
    }

    #[test]
    fn query_concatenates_shards_in_shard_id_order() {
        let config = Config { slice_capacity: 64, ..Config::default() };
        let ingestor = Ingestor::new(config, vec![table_with_term("alpha"), table_with_term("alpha")]);

        let mut b0 = DocumentBuilder::new();
        b0.add_stream(0, &["alpha"], 1, |_| 10);
        ingestor.add_document(b0.close(DocId::new(1)), ShardId(0)).unwrap();

        let mut b1 = DocumentBuilder::new();
        b1.add_stream(0, &["alpha"], 1, |_| 10);
        ingestor.add_document(b1.close(DocId::new(2)), ShardId(1)).unwrap();

        let ast = Ast::term(0, "alpha");
        let results = ingestor.query(&ast);
        assert_eq!(results, vec![DocId::new(1), DocId::new(2)]);
    }
}
