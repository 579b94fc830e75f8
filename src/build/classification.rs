/// Side of a split plane a primitive lies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum PrimClass {
    Both = 0,
    Left = 1,
    Right = 2,
    /// Straddling primitive whose clipped events were already generated.
    BothProcessed = 3,
}

impl PrimClass {
    #[inline]
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => PrimClass::Both,
            1 => PrimClass::Left,
            2 => PrimClass::Right,
            _ => PrimClass::BothProcessed,
        }
    }
}

/// Compact array of [`PrimClass`] values, two bits per primitive.
#[derive(Clone, Debug, Default)]
pub(crate) struct ClassificationStorage {
    bits: Vec<u8>,
    len: usize,
}

impl ClassificationStorage {
    /// Makes room for `len` entries, all classified as [`PrimClass::Both`].
    pub(crate) fn resize(&mut self, len: usize) {
        self.bits.clear();
        self.bits.resize(len.div_ceil(4), 0);
        self.len = len;
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn set(&mut self, index: u32, class: PrimClass) {
        let index = index as usize;
        debug_assert!(index < self.len);
        let shift = (index & 3) * 2;
        let byte = &mut self.bits[index >> 2];
        *byte = (*byte & !(0b11 << shift)) | ((class as u8) << shift);
    }

    #[inline]
    pub(crate) fn get(&self, index: u32) -> PrimClass {
        let index = index as usize;
        debug_assert!(index < self.len);
        PrimClass::from_bits(self.bits[index >> 2] >> ((index & 3) * 2))
    }

    /// Returns the memory held by the storage in bytes.
    #[inline]
    pub(crate) fn allocated_bytes(&self) -> usize {
        self.bits.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_do_not_interfere() {
        let classes = [
            PrimClass::Left,
            PrimClass::Right,
            PrimClass::BothProcessed,
            PrimClass::Both,
        ];

        let mut storage = ClassificationStorage::default();
        storage.resize(10);
        assert_eq!(storage.len(), 10);
        for i in 0..10 {
            assert_eq!(storage.get(i), PrimClass::Both);
            storage.set(i, classes[i as usize % 4]);
        }
        storage.set(5, PrimClass::Left);
        for i in 0..10 {
            let expected = if i == 5 {
                PrimClass::Left
            } else {
                classes[i as usize % 4]
            };
            assert_eq!(storage.get(i), expected);
        }

        storage.resize(3);
        assert_eq!(storage.get(0), PrimClass::Both);
    }
}
