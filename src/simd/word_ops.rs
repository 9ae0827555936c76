/// Word-at-a-time bitwise primitives shared by the matcher. Kept as a
/// dedicated module, same spirit as a SIMD-lane helper, even though the
/// current implementation is scalar: the matcher's inner loop only ever
/// touches these functions, so a future vectorized backend slots in here
/// without touching callers.
pub struct WordOps;

impl WordOps {
    #[inline]
    pub fn and(a: u64, b: u64) -> u64 {
        a & b
    }

    #[inline]
    pub fn or(a: u64, b: u64) -> u64 {
        a | b
    }

    #[inline]
    pub fn and_not(a: u64, b: u64) -> u64 {
        a & !b
    }

    /// ANDs every word in `row` into `accumulator` in place. Used to fold a
    /// term's row list into the running match result for one word position.
    #[inline]
    pub fn and_all(accumulator: u64, rows: impl IntoIterator<Item = u64>) -> u64 {
        rows.into_iter().fold(accumulator, Self::and)
    }

    #[inline]
    pub fn popcount(word: u64) -> u32 {
        word.count_ones()
    }
}
