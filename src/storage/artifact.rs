use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::core::error::Result;
use crate::index::term_table::TermTable;

/// Zero-copy read-in of a precomputed `TermTable` artifact. Naming shards
/// into files (`TermTable-<shard>.bin`, per the spec's external config
/// artifact convention) is the excluded statistics tool's job; this loader
/// only knows how to open whatever path it is given and deserialize the
/// bytes, mirroring the teacher's `mmap::mmap_file::MmapFile::open_read_only`.
pub fn load_term_table_mmap(path: &Path) -> Result<TermTable> {
    let file = File::open(path)?;
    // Safety: the artifact is treated as immutable for the mapping's
    // lifetime; nothing else in this process writes to shard config files.
    let mmap = unsafe { Mmap::map(&file)? };
    TermTable::from_bytes(&mmap)
}
