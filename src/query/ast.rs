use crate::core::types::StreamId;

/// Parsed boolean query tree. Grammar precedence, loosest to tightest:
/// `Or` (`A | B`), then `And` (explicit `A & B` or bare adjacency `A B`),
/// then `Not` (`-X`) and parenthesized groups.
///
/// A quoted phrase compiles to a `Phrase` node rather than being expanded
/// into nested `And`s of `Term`s at parse time: composing its n-grams needs
/// the stream's configured `MaxGramSize`, which the parser doesn't carry —
/// that expansion happens in `QueryPlanner` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ast {
    Term { stream_id: StreamId, text: String },
    Phrase { stream_id: StreamId, words: Vec<String> },
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
    /// Every active document, regardless of content. Not reachable from any
    /// literal query syntax — `'*'` is an ordinary unigram character, per
    /// the grammar's TERM/UNIGRAM rule — but still useful to construct
    /// directly (tests, a future "browse all" entry point).
    MatchAll,
    /// No document at all. What an empty query string parses to.
    MatchNone,
}

impl Ast {
    pub fn term(stream_id: StreamId, text: impl Into<String>) -> Self {
        Ast::Term { stream_id, text: text.into() }
    }

    pub fn phrase(stream_id: StreamId, words: Vec<String>) -> Self {
        Ast::Phrase { stream_id, words }
    }

    pub fn and(self, other: Ast) -> Self {
        Ast::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Ast) -> Self {
        Ast::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Self {
        Ast::Not(Box::new(self))
    }
}
