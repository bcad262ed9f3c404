//! Client-side chunking of objects larger than the store's size limit.
//!
//! [`plan`] decides how a file is split and what each chunk is called;
//! [`assemble`] puts the chunks back together on download.

pub mod assemble;
pub mod plan;

pub use assemble::{
    chunk_key_pattern, chunk_sequence, select_chunk_keys, sort_by_sequence, AssemblyReport,
    AssemblyState, ChunkAssembler,
};
pub use plan::{
    check_single_part, chunk_count, chunk_key, plan_chunks, plan_file, ChunkPlan, ChunkSpec,
    MAX_CHUNKS, SUFFIX_WIDTH,
};
