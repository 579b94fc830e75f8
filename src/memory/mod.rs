//! Storage used during construction: the shared append-only node and index arrays and the
//! per-worker stack allocators backing event lists.

mod concurrent_array;
mod ordered_chunk;

pub(crate) use concurrent_array::GrowableConcurrentArray;
pub(crate) use ordered_chunk::{Allocation, OrderedChunkAllocator};
