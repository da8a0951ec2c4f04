use crate::datagram::Datagram;
use crate::field::Field;

/// a byte array field of `len` bytes, each byte holding the low bits of `id`
pub fn bytes_field(id: u16, len: usize) -> Field {
    Field::from_bytes(id, &vec![id as u8; len])
        .expect("test field lengths are small")
}

/// a datagram of byte array fields with ids 1, 2, ... and the given sizes
pub fn test_datagram(sizes: &[usize]) -> Datagram {
    sizes.iter()
        .enumerate()
        .map(|(i, &len)| bytes_field(i as u16 + 1, len))
        .collect()
}
