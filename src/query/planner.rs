use crate::core::types::StreamId;
use crate::index::row_id::RowId;
use crate::index::term::{sliding_window_terms, Term};
use crate::index::term_table::TermTable;
use crate::query::ast::Ast;

/// Row-level execution plan. A `Term` expands to one `Row` per bloom row
/// the term's recipe names, all ANDed together — resolving a term to its
/// rows happens once, at plan time, not per document.
///
/// `AndNot` is the fused form `simplify` produces when an `And` has one or
/// more negated children: the matcher computes it as a single AND-then-
/// ANDNOT fold over its hot loop instead of negating a whole word and
/// ANDing it in separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Row(RowId),
    And(Vec<Plan>),
    Or(Vec<Plan>),
    Not(Box<Plan>),
    AndNot(Vec<Plan>, Vec<Plan>),
}

/// Lowers a parsed query into a `Plan` against one shard's `TermTable`, ANDs
/// in the reserved `DocumentActive` row so deleted documents never surface
/// regardless of what the query itself asks for, and simplifies the result:
/// constant-folds `MatchAll`/`MatchNone`, pushes `Not` children of an `And`
/// into an `AndNot`, and drops duplicate rows.
pub struct QueryPlanner<'a> {
    term_table: &'a TermTable,
    max_gram_size: u8,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(term_table: &'a TermTable, max_gram_size: u8) -> Self {
        QueryPlanner { term_table, max_gram_size }
    }

    pub fn plan(&self, ast: &Ast) -> Plan {
        let body = self.plan_node(ast);
        let raw = Plan::And(vec![body, Plan::Row(self.term_table.document_active_row())]);
        simplify(raw, self.term_table.match_all_row(), self.term_table.match_none_row())
    }

    fn plan_node(&self, ast: &Ast) -> Plan {
        match ast {
            Ast::MatchAll => Plan::Row(self.term_table.match_all_row()),
            Ast::MatchNone => Plan::Row(self.term_table.match_none_row()),
            Ast::Term { stream_id, text } => self.plan_term(*stream_id, text),
            Ast::Phrase { stream_id, words } => self.plan_phrase(*stream_id, words),
            Ast::And(a, b) => Plan::And(vec![self.plan_node(a), self.plan_node(b)]),
            Ast::Or(a, b) => Plan::Or(vec![self.plan_node(a), self.plan_node(b)]),
            Ast::Not(a) => Plan::Not(Box::new(self.plan_node(a))),
        }
    }

    fn plan_term(&self, stream_id: StreamId, text: &str) -> Plan {
        let term = Term::from_text(text, stream_id, 0);
        self.plan_rows_for(&term)
    }

    /// A phrase is every sliding window of `1..=max_gram_size` adjacent
    /// words, ANDed together — the same window set ingestion records as
    /// postings for the matching token sequence, so a document containing
    /// the phrase necessarily carries every one of these rows. Because the
    /// index stores no positions, this can admit rare false positives from
    /// documents whose words happen to form the same bag of n-grams in a
    /// different arrangement; it can never produce a false negative.
    fn plan_phrase(&self, stream_id: StreamId, words: &[String]) -> Plan {
        let refs: Vec<&str> = words.iter().map(String::as_str).collect();
        let terms = sliding_window_terms(stream_id, &refs, self.max_gram_size, &|_| 0u16);
        let mut plans = Vec::with_capacity(terms.len());
        for term in &terms {
            plans.push(self.plan_rows_for(term));
        }
        Plan::And(plans)
    }

    fn plan_rows_for(&self, term: &Term) -> Plan {
        let rows = self.term_table.resolve(term);
        if rows.is_empty() {
            // An unregistered term can never match; MatchNone short-circuits
            // the whole branch instead of silently ANDing zero rows (which
            // would otherwise vacuously evaluate to "all bits set").
            Plan::Row(self.term_table.match_none_row())
        } else {
            Plan::And(rows.into_iter().map(Plan::Row).collect())
        }
    }
}

fn simplify(plan: Plan, match_all: RowId, match_none: RowId) -> Plan {
    match plan {
        Plan::Row(_) => plan,
        Plan::Not(inner) => match simplify(*inner, match_all, match_none) {
            Plan::Row(r) if r == match_all => Plan::Row(match_none),
            Plan::Row(r) if r == match_none => Plan::Row(match_all),
            other => Plan::Not(Box::new(other)),
        },
        Plan::And(children) => simplify_and(children, match_all, match_none),
        Plan::Or(children) => simplify_or(children, match_all, match_none),
        Plan::AndNot(required, excluded) => {
            // Already-simplified plans can be re-simplified idempotently
            // (e.g. a sub-plan built directly from literal Plan values in
            // tests); re-run both halves through the same And/Or folding.
            let rebuilt = Plan::And(
                required
                    .into_iter()
                    .chain(excluded.into_iter().map(|e| Plan::Not(Box::new(e))))
                    .collect(),
            );
            simplify(rebuilt, match_all, match_none)
        }
    }
}

fn simplify_and(children: Vec<Plan>, match_all: RowId, match_none: RowId) -> Plan {
    let mut required = Vec::new();
    let mut excluded = Vec::new();

    for child in children {
        let child = simplify(child, match_all, match_none);
        match child {
            Plan::Row(r) if r == match_none => return Plan::Row(match_none),
            Plan::Row(r) if r == match_all => continue,
            Plan::Not(inner) => push_unique(&mut excluded, *inner),
            other => push_unique(&mut required, other),
        }
    }

    if required.is_empty() && excluded.is_empty() {
        return Plan::Row(match_all);
    }
    if excluded.is_empty() {
        return unwrap_singleton_and(required);
    }
    if required.is_empty() {
        // No positive requirement to anchor the AND-NOT against: the whole
        // branch is "not any of these", expressed as a plain negated OR.
        return Plan::Not(Box::new(simplify(Plan::Or(excluded), match_all, match_none)));
    }
    Plan::AndNot(required, excluded)
}

fn simplify_or(children: Vec<Plan>, match_all: RowId, match_none: RowId) -> Plan {
    let mut kept = Vec::new();
    for child in children {
        let child = simplify(child, match_all, match_none);
        match child {
            Plan::Row(r) if r == match_all => return Plan::Row(match_all),
            Plan::Row(r) if r == match_none => continue,
            other => push_unique(&mut kept, other),
        }
    }
    if kept.is_empty() {
        return Plan::Row(match_none);
    }
    unwrap_singleton_or(kept)
}

fn push_unique(into: &mut Vec<Plan>, plan: Plan) {
    if !into.contains(&plan) {
        into.push(plan);
    }
}

fn unwrap_singleton_and(mut plans: Vec<Plan>) -> Plan {
    if plans.len() == 1 {
        plans.pop().unwrap()
    } else {
        Plan::And(plans)
    }
}

fn unwrap_singleton_or(mut plans: Vec<Plan>) -> Plan {
    if plans.len() == 1 {
        plans.pop().unwrap()
    } else {
        Plan::Or(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Rank, MAX_RANK};
    use crate::index::term::Term as IndexTerm;
    use crate::index::term_table::TermTableBuilder;

    fn table_with_one_term() -> TermTable {
        let mut b = TermTableBuilder::new();
        b.open_term();
        b.add_row_id(Rank::new(0), 2);
        b.close_term(IndexTerm::from_text("alpha", 0, 0).hash);
        b.set_row_counts(Rank::new(0), 3, 0);
        for r in 1..=MAX_RANK {
            b.set_row_counts(Rank::new(r), 0, 0);
        }
        b.set_fact_count(0);
        b.seal()
    }

    #[test]
    fn known_term_plans_to_its_registered_row_plus_document_active() {
        let table = table_with_one_term();
        let planner = QueryPlanner::new(&table, 3);
        let plan = planner.plan(&Ast::term(0, "alpha"));
        assert_eq!(
            plan,
            Plan::And(vec![Plan::Row(RowId::new(Rank::new(0), 2)), Plan::Row(table.document_active_row())])
        );
    }

    #[test]
    fn unknown_term_plans_to_match_none() {
        let table = table_with_one_term();
        let planner = QueryPlanner::new(&table, 3);
        let plan = planner.plan(&Ast::term(0, "unregistered"));
        assert_eq!(plan, Plan::Row(table.match_none_row()));
    }

    #[test]
    fn match_all_query_plans_to_just_document_active() {
        let table = table_with_one_term();
        let planner = QueryPlanner::new(&table, 3);
        let plan = planner.plan(&Ast::MatchAll);
        assert_eq!(plan, Plan::Row(table.document_active_row()));
    }

    #[test]
    fn match_none_query_plans_to_match_none_regardless_of_document_active() {
        let table = table_with_one_term();
        let planner = QueryPlanner::new(&table, 3);
        let plan = planner.plan(&Ast::MatchNone);
        assert_eq!(plan, Plan::Row(table.match_none_row()));
    }

    #[test]
    fn not_of_a_known_term_folds_into_and_not() {
        let table = table_with_one_term();
        let planner = QueryPlanner::new(&table, 3);
        let plan = planner.plan(&Ast::term(0, "alpha").not());
        assert_eq!(
            plan,
            Plan::AndNot(
                vec![Plan::Row(table.document_active_row())],
                vec![Plan::Row(RowId::new(Rank::new(0), 2))]
            )
        );
    }

    #[test]
    fn duplicate_rows_collapse_in_an_or() {
        let table = table_with_one_term();
        let planner = QueryPlanner::new(&table, 3);
        let ast = Ast::term(0, "alpha").or(Ast::term(0, "alpha"));
        let plan = planner.plan(&ast);
        assert_eq!(
            plan,
            Plan::And(vec![Plan::Row(RowId::new(Rank::new(0), 2)), Plan::Row(table.document_active_row())])
        );
    }

    #[test]
    fn phrase_expands_to_an_and_of_every_sliding_window() {
        let mut b = TermTableBuilder::new();
        let words = ["shall", "i"];
        let unigram_shall = IndexTerm::from_text("shall", 0, 0);
        let unigram_i = IndexTerm::from_text("i", 0, 0);
        let bigram = IndexTerm::compose(&unigram_shall, &unigram_i);

        for (i, term) in [unigram_shall, unigram_i, bigram].iter().enumerate() {
            b.open_term();
            b.add_row_id(Rank::new(0), i as u32 + 2);
            b.close_term(term.hash);
        }
        b.set_row_counts(Rank::new(0), 5, 0);
        for r in 1..=MAX_RANK {
            b.set_row_counts(Rank::new(r), 0, 0);
        }
        b.set_fact_count(0);
        let table = b.seal();

        let planner = QueryPlanner::new(&table, 2);
        let plan = planner.plan(&Ast::phrase(0, words.iter().map(|w| w.to_string()).collect()));
        // Expect AND of [shall, i, "shall i" bigram, DocumentActive] in some
        // folded shape; at minimum every row must be present somewhere.
        let mut rows = Vec::new();
        collect_rows(&plan, &mut rows);
        assert_eq!(rows.len(), 4);
    }

    fn collect_rows(plan: &Plan, out: &mut Vec<RowId>) {
        match plan {
            Plan::Row(r) => out.push(*r),
            Plan::And(cs) | Plan::Or(cs) => cs.iter().for_each(|c| collect_rows(c, out)),
            Plan::Not(c) => collect_rows(c, out),
            Plan::AndNot(req, exc) => {
                req.iter().for_each(|c| collect_rows(c, out));
                exc.iter().for_each(|c| collect_rows(c, out));
            }
        }
    }
}
