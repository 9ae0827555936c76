use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;

use bitfunnel_core::core::config::Config;
use bitfunnel_core::core::types::{Rank, ShardId, MAX_RANK};
use bitfunnel_core::index::term::Term;
use bitfunnel_core::index::term_table::TermTableBuilder;
use bitfunnel_core::{DocId, DocumentBuilder, Ingestor};

fn sample_table() -> Arc<bitfunnel_core::index::term_table::TermTable> {
    let mut b = TermTableBuilder::new();
    for i in 0..64u32 {
        let term = Term::from_text(&format!("word{i}"), 0, 10);
        b.open_term();
        b.add_row_id(Rank::new(0), i + 3);
        b.close_term(term.hash);
    }
    b.set_row_counts(Rank::new(0), 67, 32);
    for r in 1..=MAX_RANK {
        b.set_row_counts(Rank::new(r), 0, 0);
    }
    b.set_fact_count(0);
    Arc::new(b.seal())
}

fn ingest_one_shard(c: &mut Criterion) {
    c.bench_function("ingest_1000_documents", |b| {
        b.iter(|| {
            let config = Config { slice_capacity: 4096, ..Config::default() };
            let ingestor = Ingestor::new(config, vec![sample_table()]);
            let mut rng = rand::thread_rng();
            for i in 0..1000u64 {
                let mut builder = DocumentBuilder::new();
                let tokens: Vec<String> = (0..20).map(|_| format!("word{}", rng.gen_range(0..64))).collect();
                let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
                builder.add_stream(0, &refs, 3, |_| 10);
                ingestor
                    .add_document(builder.close(DocId::new(i)), ShardId(0))
                    .unwrap();
            }
            black_box(ingestor.stats().total_documents)
        });
    });
}

criterion_group!(benches, ingest_one_shard);
criterion_main!(benches);
