use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bitfunnel_core::core::config::Config;
use bitfunnel_core::core::types::{Rank, ShardId, MAX_RANK};
use bitfunnel_core::index::term::Term;
use bitfunnel_core::index::term_table::{TermTable, TermTableBuilder};
use bitfunnel_core::{DocId, DocumentBuilder, Ingestor, Matcher, QueryParser, QueryPlanner};

fn sample_table() -> Arc<TermTable> {
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

fn build_ingestor() -> Ingestor {
    let config = Config { slice_capacity: 4096, ..Config::default() };
    let ingestor = Ingestor::new(config, vec![sample_table()]);
    for i in 0..4000u64 {
        let mut builder = DocumentBuilder::new();
        let tokens: Vec<String> = (0..20).map(|j| format!("word{}", (i + j) % 64)).collect();
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        builder.add_stream(0, &refs, 1, |_| 10);
        ingestor.add_document(builder.close(DocId::new(i)), ShardId(0)).unwrap();
    }
    ingestor
}

fn query_one_shard(c: &mut Criterion) {
    let ingestor = build_ingestor();
    let shard = ingestor.shard(ShardId(0));
    let ast = QueryParser::parse("word1 & word2 | word3", 0).unwrap();
    let plan = QueryPlanner::new(&shard.term_table, 1).plan(&ast);

    c.bench_function("match_boolean_query_4000_docs", |b| {
        b.iter(|| black_box(Matcher::execute(shard, &plan).len()));
    });
}

criterion_group!(benches, query_one_shard);
criterion_main!(benches);
