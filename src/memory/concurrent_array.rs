use crate::KdTreeError;
use crossbeam_utils::atomic::AtomicCell;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    OnceLock,
};

const MAX_SLICES: usize = 32;

/// Largest number of elements the array can hold.
pub(crate) const MAX_LEN: usize = u32::MAX as usize;

/// Append-only array that can be grown and written from several threads.
///
/// Storage is split in slices of doubling sizes (1, 2, 4, ...) that are never moved once
/// allocated, so indices handed out by [`grow_by`](Self::grow_by) stay valid while other threads
/// keep growing the array. Each reserved slot is expected to be written by a single thread.
pub(crate) struct GrowableConcurrentArray<T> {
    slices: [OnceLock<Box<[AtomicCell<T>]>>; MAX_SLICES],
    // Size in the low half, capacity in the high half.
    size_capacity: AtomicU64,
}

#[inline]
fn pack(size: u64, capacity: u64) -> u64 {
    size | (capacity << 32)
}

#[inline]
fn unpack(word: u64) -> (u64, u64) {
    (word & u32::MAX as u64, word >> 32)
}

/// Returns the slice holding `index` and the offset inside it.
#[inline]
fn locate(index: usize) -> (usize, usize) {
    let i = index as u64 + 1;
    let slice = 63 - i.leading_zeros() as usize;
    (slice, (i - (1 << slice)) as usize)
}

impl<T: Copy + Default> Default for GrowableConcurrentArray<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default> GrowableConcurrentArray<T> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            slices: std::array::from_fn(|_| OnceLock::new()),
            size_capacity: AtomicU64::new(0),
        }
    }

    #[inline]
    fn ensure_slice(&self, slice: usize) {
        self.slices[slice]
            .get_or_init(|| (0..1usize << slice).map(|_| AtomicCell::default()).collect());
    }

    /// Allocates the slices needed to hold at least `capacity` elements.
    pub(crate) fn reserve(&self, capacity: usize) {
        let capacity = capacity.min(MAX_LEN) as u64;
        let mut current = self.size_capacity.load(Ordering::Acquire);
        loop {
            let (size, mut new_capacity) = unpack(current);
            if new_capacity >= capacity {
                return;
            }
            while new_capacity < capacity {
                self.ensure_slice((new_capacity + 1).trailing_zeros() as usize);
                new_capacity = 2 * new_capacity + 1;
            }

            match self.size_capacity.compare_exchange_weak(
                current,
                pack(size, new_capacity),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Reserves `amount` contiguous slots and returns the index of the first one.
    pub(crate) fn grow_by(&self, amount: usize) -> Result<usize, KdTreeError> {
        let mut current = self.size_capacity.load(Ordering::Acquire);
        loop {
            let (size, capacity) = unpack(current);
            let new_size = size + amount as u64;
            if new_size > MAX_LEN as u64 {
                return Err(KdTreeError::CapacityOverflow {
                    what: "array length",
                    value: new_size as usize,
                    limit: MAX_LEN,
                });
            }

            let mut new_capacity = capacity;
            while new_capacity < new_size {
                self.ensure_slice((new_capacity + 1).trailing_zeros() as usize);
                new_capacity = 2 * new_capacity + 1;
            }

            match self.size_capacity.compare_exchange_weak(
                current,
                pack(new_size, new_capacity),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(size as usize),
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns the element at `index`, or `None` if its slice was never allocated.
    #[inline]
    pub(crate) fn get(&self, index: usize) -> Option<T> {
        let (slice, offset) = locate(index);
        self.slices[slice].get().map(|s| s[offset].load())
    }

    /// Writes the element at a reserved `index`.
    #[inline]
    pub(crate) fn set(&self, index: usize, value: T) {
        debug_assert!(index < self.len(), "writing slot {} before reserving it", index);
        let (slice, offset) = locate(index);
        if let Some(s) = self.slices[slice].get() {
            s[offset].store(value);
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        unpack(self.size_capacity.load(Ordering::Acquire)).0 as usize
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        unpack(self.size_capacity.load(Ordering::Acquire)).1 as usize
    }

    /// Copies the reserved elements into a flat vector.
    pub(crate) fn to_vec(&self) -> Vec<T> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }
}
