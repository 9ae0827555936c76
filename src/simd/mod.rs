pub mod word_ops;

pub use word_ops::WordOps;
