pub mod artifact;
pub mod ingestor;
pub mod shard;
pub mod slice;

pub use artifact::load_term_table_mmap;
pub use ingestor::Ingestor;
pub use shard::Shard;
pub use slice::{RankBuffer, Slice};
