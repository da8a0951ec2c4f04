//! Conversions between the wire's 16 bit quantities (field ids, sizes, manifest offsets) and
//!  `usize` lengths / indices.

pub trait SafeCast<T> {
    fn safe_cast(self) -> T;
}

impl SafeCast<usize> for u16 {
    fn safe_cast(self) -> usize {
        self as usize
    }
}

impl SafeCast<u64> for usize {
    fn safe_cast(self) -> u64 {
        self as u64
    }
}


/// For narrowing casts where business logic ensures that the value is in the narrower type's range.
/// NB: The implementations will panic otherwise
pub trait PrecheckedCast<T> {
    fn prechecked_cast(self) -> T;
}
impl PrecheckedCast<u16> for usize {
    fn prechecked_cast(self) -> u16 {
        self.try_into().expect("this is a bug: application logic should have ensured the value range")
    }
}

/// Truncates to the lower 16 bits, which is what the manifest table stores for offsets
pub trait LowBits16 {
    fn low_bits_16(self) -> u16;
}
impl LowBits16 for usize {
    fn low_bits_16(self) -> u16 {
        (self & 0xffff) as u16
    }
}
