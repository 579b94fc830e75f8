use std::mem::size_of;

/// Minimum size of a chunk in bytes.
pub(crate) const MIN_CHUNK_BYTES: usize = 5 * 1024 * 1024;

/// Handle to a block returned by [`OrderedChunkAllocator::allocate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Allocation {
    chunk: usize,
    start: usize,
    len: usize,
}

impl Allocation {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[derive(Debug)]
struct Chunk<T> {
    data: Vec<T>,
    top: usize,
    // Starts of the live blocks, most recent last.
    live: Vec<usize>,
}

impl<T> Chunk<T> {
    #[inline]
    fn remaining(&self) -> usize {
        self.data.len() - self.top
    }
}

/// Bump allocator releasing blocks in stack order.
///
/// Only the most recently allocated live block of a chunk may be shrunk or released. Blocks are
/// addressed through [`Allocation`] handles and borrowed from the allocator on demand, so several
/// blocks can be written at once with [`get_disjoint_mut`](Self::get_disjoint_mut).
#[derive(Debug)]
pub(crate) struct OrderedChunkAllocator<T> {
    chunks: Vec<Chunk<T>>,
    min_chunk_len: usize,
}

impl<T: Copy + Default> Default for OrderedChunkAllocator<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedChunkAllocator<T> {
    /// Returns the number of live blocks.
    #[inline]
    pub(crate) fn live_allocations(&self) -> usize {
        self.chunks.iter().map(|c| c.live.len()).sum()
    }

    /// Returns the memory held by the chunks in bytes.
    #[inline]
    pub(crate) fn allocated_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.data.len()).sum::<usize>() * size_of::<T>()
    }
}

impl<T: Copy + Default> OrderedChunkAllocator<T> {
    /// Creates a new allocator whose chunks hold at least [`MIN_CHUNK_BYTES`].
    #[inline]
    pub(crate) fn new() -> Self {
        Self::with_min_chunk_len(MIN_CHUNK_BYTES / size_of::<T>().max(1))
    }

    #[inline]
    pub(crate) fn with_min_chunk_len(min_chunk_len: usize) -> Self {
        Self {
            chunks: Vec::new(),
            min_chunk_len: min_chunk_len.max(1),
        }
    }

    /// Allocates a block of `len` elements, from the first chunk with enough room left or from a
    /// new chunk.
    pub(crate) fn allocate(&mut self, len: usize) -> Allocation {
        let chunk = match self.chunks.iter().position(|c| c.remaining() >= len) {
            Some(chunk) => chunk,
            None => {
                self.chunks.push(Chunk {
                    data: vec![T::default(); len.max(self.min_chunk_len)],
                    top: 0,
                    live: Vec::new(),
                });
                self.chunks.len() - 1
            }
        };

        let c = &mut self.chunks[chunk];
        let start = c.top;
        c.top += len;
        c.live.push(start);
        Allocation { chunk, start, len }
    }

    /// Shrinks the most recent live block of its chunk to `new_len` elements.
    pub(crate) fn shrink_allocation(&mut self, allocation: &mut Allocation, new_len: usize) {
        debug_assert!(new_len <= allocation.len);
        let c = &mut self.chunks[allocation.chunk];
        debug_assert_eq!(
            c.live.last(),
            Some(&allocation.start),
            "shrinking a block that is not the most recent one of its chunk"
        );
        c.top = allocation.start + new_len;
        allocation.len = new_len;
    }

    /// Releases the most recent live block of its chunk.
    pub(crate) fn release(&mut self, allocation: Allocation) {
        let c = &mut self.chunks[allocation.chunk];
        debug_assert_eq!(
            c.live.last(),
            Some(&allocation.start),
            "releasing a block that is not the most recent one of its chunk"
        );
        c.live.pop();
        c.top = allocation.start;
    }

    #[inline]
    pub(crate) fn get(&self, allocation: &Allocation) -> &[T] {
        let start = allocation.start;
        &self.chunks[allocation.chunk].data[start..start + allocation.len]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, allocation: &Allocation) -> &mut [T] {
        let start = allocation.start;
        &mut self.chunks[allocation.chunk].data[start..start + allocation.len]
    }

    /// Borrows several non-overlapping blocks mutably at once.
    ///
    /// # Panics
    ///
    /// Panics if two of the blocks overlap.
    pub(crate) fn get_disjoint_mut<const K: usize>(
        &mut self,
        allocations: [&Allocation; K],
    ) -> [&mut [T]; K] {
        let mut order: [usize; K] = std::array::from_fn(|i| i);
        order.sort_unstable_by_key(|&i| (allocations[i].chunk, allocations[i].start));

        let mut result: [Option<&mut [T]>; K] = std::array::from_fn(|_| None);
        let mut chunks = self.chunks.iter_mut().enumerate();
        // Current chunk, its part not handed out yet and the offset of that part.
        let mut current: Option<(usize, &mut [T], usize)> = None;

        for i in order {
            let allocation = allocations[i];
            while current.as_ref().map_or(true, |(c, _, _)| *c != allocation.chunk) {
                match chunks.next() {
                    Some((c, chunk)) => current = Some((c, chunk.data.as_mut_slice(), 0)),
                    None => break,
                }
            }

            if let Some((c, rest, offset)) = current.take() {
                assert!(allocation.start >= offset, "overlapping blocks");
                let (_, tail) = rest.split_at_mut(allocation.start - offset);
                let (block, tail) = tail.split_at_mut(allocation.len);
                result[i] = Some(block);
                current = Some((c, tail, allocation.start + allocation.len));
            }
        }

        result.map(Option::unwrap_or_default)
    }
}

impl<T> Drop for OrderedChunkAllocator<T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert_eq!(
                self.live_allocations(),
                0,
                "allocator dropped with live blocks"
            );
        }
    }
}
