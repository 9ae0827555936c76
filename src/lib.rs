pub mod core;
pub mod index;
pub mod memory;
pub mod mvcc;
pub mod parallel;
pub mod query;
pub mod simd;
pub mod storage;

pub use core::config::Config;
pub use core::document::{Document, DocumentBuilder};
pub use core::error::{Error, ErrorKind, Result};
pub use core::types::{DocId, Rank, ShardId};
pub use query::{Ast, MatchStats, Matcher, Plan, QueryParser, QueryPlanner};
pub use storage::Ingestor;

/*
┌────────────────────────────────────────────────────────────────────────────┐
│                         SIGNATURE-FILE SEARCH CORE                         │
└────────────────────────────────────────────────────────────────────────────┘

  DocumentBuilder ──closes into──> Document ──ingested by──> Ingestor
                                                                  │
                                                   picks a shard, calls
                                                                  ▼
  TermTable ──resolves Term──> [RowId] ──written to──> Slice (bit matrix)
       ▲                                                         │
       │ shared, read-only, one per shard                owned by Shard's
       │                                                  append-only arena
       │                                                         │
  QueryParser ──produces──> Ast ──lowered by──> QueryPlanner ──> Plan
                                                                  │
                                                     evaluated word-at-a-time
                                                                  ▼
                                                        Matcher ──> [DocId]

  Token / TokenTracker / TokenManager (mvcc) track in-flight readers so a
  sealed Slice's last Arc handle is only dropped, via Recycler, once every
  reader that could still see it has finished.

  WorkerPool + BlockingQueue (parallel) decouple ingestion callers from the
  cost of tokenizing and writing bits; Matcher parallelizes query execution
  across a shard's slices with rayon.
*/
