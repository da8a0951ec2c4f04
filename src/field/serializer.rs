//! Wire codec for a single [Field].
//!
//! With metadata embedded, a field is written as a fixed 6 byte header followed by its payload,
//!  all numbers in network byte order (BE):
//!
//! ```ascii
//! 0: id (u16)
//! 2: field type (u8)
//! 3: size (u16) - 0xFFFF means 'until the end of the buffer'
//! 5: category (u8)
//! 6: payload ('size' bytes)
//! ```
//!
//! Without metadata, only the payload is written and the reader must know the field's
//!  descriptor.
//!
//! Payload encoding: 1-byte primitives are copied verbatim, 2, 4 and 8 byte primitives are
//!  stored in network byte order, strings and byte arrays are copied verbatim. Undefined fields
//!  have no payload.

use anyhow::anyhow;
use bytes::{Buf, BufMut};
use tracing::trace;

use crate::error::{DatagramError, Result};
use crate::field::field::{Field, MAX_VALUE_LEN};
use crate::field::metafield::{FieldCategory, FieldType, Metafield};
use crate::util::safe_converter::{PrecheckedCast, SafeCast};

pub const HEADER_SIZE: usize = 6;

pub struct FieldSerializer;

impl FieldSerializer {
    pub fn serialized_len(field: &Field, embed_metadata: bool) -> usize {
        if embed_metadata {
            HEADER_SIZE + field.size()
        }
        else {
            field.size()
        }
    }

    /// Writes `field` into `buf` starting at `index`, returning the number of bytes written.
    ///
    /// Nothing is written unless the whole field fits.
    pub fn serialize(field: &Field, buf: &mut [u8], index: usize, embed_metadata: bool) -> Result<usize> {
        Self::check_index(buf.len(), index)?;

        let len = Self::serialized_len(field, embed_metadata);
        let available = buf.len() - index;
        if len > available {
            return Err(DatagramError::serialization(
                format!("serializing field {}", field.id()),
                anyhow!("field needs {} bytes, only {} available", len, available),
            ));
        }

        let mut out = &mut buf[index..index + len];
        if embed_metadata {
            Self::write_header(field, &mut out);
        }
        Self::write_payload(field, &mut out);
        debug_assert!(out.is_empty());

        trace!("serialized {:?} at {}: {} bytes", field, index, len);
        Ok(len)
    }

    fn write_header(field: &Field, out: &mut impl BufMut) {
        let meta = field.metafield_ref();
        out.put_u16(meta.id());
        out.put_u8(meta.field_type().into());
        // the actual size rather than 'unset' so that a field can be followed by other fields
        out.put_u16(field.size().prechecked_cast());
        out.put_u8(meta.category().into());
    }

    fn write_payload(field: &Field, out: &mut impl BufMut) {
        let size = field.size();
        let value = field.bytes();

        if field.field_type().is_primitive() && value.len() == size {
            match value.len() {
                1 => out.put_u8(value[0]),
                2 => out.put_u16(u16::from_ne_bytes([value[0], value[1]])),
                4 => out.put_u32(u32::from_ne_bytes([value[0], value[1], value[2], value[3]])),
                8 => out.put_u64(u64::from_ne_bytes([value[0], value[1], value[2], value[3], value[4], value[5], value[6], value[7]])),
                _ => unreachable!("primitive sizes are validated by Metafield"),
            }
        }
        else {
            // a field without a value (or with a shorter one) is padded with zeroes to its size
            let n = value.len().min(size);
            out.put_slice(&value[..n]);
            out.put_bytes(0, size - n);
        }
    }

    /// Reads a field with an embedded header at `index`, returning the field and the number of
    ///  bytes consumed.
    pub fn deserialize(buf: &[u8], index: usize) -> Result<(Field, usize)> {
        Self::check_index(buf.len(), index)?;

        let mut input = &buf[index..];
        let meta = Self::read_header(&mut input)
            .map_err(|e| e.into_serialization(format!("reading field header at {}", index)))?;
        let (field, payload_len) = Self::read_payload(meta, input)
            .map_err(|e| e.into_serialization(format!("reading field payload at {}", index + HEADER_SIZE)))?;

        trace!("deserialized {:?} at {}", field, index);
        Ok((field, HEADER_SIZE + payload_len))
    }

    /// Reads the payload of a field at `index` without a header, using `descriptor` for id, type
    ///  and size. Returns the field and the number of bytes consumed.
    pub fn deserialize_with(buf: &[u8], index: usize, descriptor: &Metafield) -> Result<(Field, usize)> {
        Self::check_index(buf.len(), index)?;

        let (field, len) = Self::read_payload(descriptor.clone(), &buf[index..])
            .map_err(|e| e.into_serialization(format!("reading payload for {:?} at {}", descriptor, index)))?;

        trace!("deserialized {:?} at {}", field, index);
        Ok((field, len))
    }

    fn check_index(buf_len: usize, index: usize) -> Result<()> {
        if index >= buf_len {
            return Err(DatagramError::OutOfRange {
                what: "buffer index",
                value: index.safe_cast(),
                allowed: "0..buffer length",
            });
        }
        Ok(())
    }

    fn read_header(input: &mut &[u8]) -> Result<Metafield> {
        if input.remaining() < HEADER_SIZE {
            return Err(DatagramError::serialization("truncated field header", anyhow!("{} bytes remaining, header has {}", input.remaining(), HEADER_SIZE)));
        }

        let id = input.get_u16();
        let raw_type = input.get_u8();
        let size = input.get_u16();
        let raw_category = input.get_u8();

        let field_type = FieldType::try_from(raw_type)
            .map_err(|_| DatagramError::serialization("invalid field header", anyhow!("unknown field type {}", raw_type)))?;
        let category = FieldCategory::try_from(raw_category)
            .map_err(|_| DatagramError::serialization("invalid field header", anyhow!("unknown field category {}", raw_category)))?;

        Metafield::with_category(id, field_type, size, category)
    }

    fn read_payload(mut meta: Metafield, input: &[u8]) -> Result<(Field, usize)> {
        let len = if meta.is_size_unset() {
            input.len()
        }
        else {
            meta.size().safe_cast()
        };

        if input.len() < len {
            return Err(DatagramError::serialization("truncated field payload", anyhow!("{} bytes remaining, field has {}", input.len(), len)));
        }
        let mut raw = &input[..len];

        let value = match meta.field_type() {
            FieldType::Undefined => None,
            FieldType::Integral | FieldType::FloatingPoint => Some(match len {
                1 => vec![raw.get_u8()],
                2 => raw.get_u16().to_ne_bytes().to_vec(),
                4 => raw.get_u32().to_ne_bytes().to_vec(),
                8 => raw.get_u64().to_ne_bytes().to_vec(),
                _ => unreachable!("primitive sizes are validated by Metafield"),
            }),
            FieldType::String | FieldType::ByteArray => Some(raw.to_vec()),
        };

        if meta.is_size_unset() && len <= MAX_VALUE_LEN {
            meta.set_size(len.prechecked_cast())?;
        }

        Ok((Field::from_parts(meta, value), len))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;
    use crate::field::metafield::SIZE_UNSET;

    fn with_category(mut field: Field, category: FieldCategory) -> Field {
        field.set_category(category).unwrap();
        field
    }

    #[rstest]
    #[case::u8(Field::from_u8(1, 0xab))]
    #[case::i16(Field::from_i16(2, -12345))]
    #[case::i32(Field::from_i32(3, i32::MIN))]
    #[case::i64(Field::from_i64(4, i64::MAX))]
    #[case::f32(Field::from_f32(5, -0.125))]
    #[case::f64(Field::from_f64(6, std::f64::consts::PI))]
    #[case::string(Field::from_string(7, "hello, wörld").unwrap())]
    #[case::bytes(Field::from_bytes(8, &[0, 1, 2, 255]).unwrap())]
    #[case::empty_bytes(Field::from_bytes(9, b"").unwrap())]
    #[case::undefined(Field::new(Metafield::new(10)))]
    #[case::payload_category(with_category(Field::from_i32(65535, 17), FieldCategory::Payload))]
    fn test_round_trip_with_metadata(#[case] field: Field) {
        let mut buf = vec![0xeeu8; FieldSerializer::serialized_len(&field, true) + 3];
        let written = FieldSerializer::serialize(&field, &mut buf, 3, true).unwrap();
        assert_eq!(written, HEADER_SIZE + field.size());

        let (actual, consumed) = FieldSerializer::deserialize(&buf, 3).unwrap();
        assert_eq!(consumed, written);
        assert_eq!(actual, field);
        assert_eq!(actual.metafield(), field.metafield());
    }

    #[rstest]
    #[case::i16(Field::from_i16(2, 0x0102))]
    #[case::f64(Field::from_f64(6, -1.0e300))]
    #[case::string(Field::from_string(7, "abc").unwrap())]
    #[case::bytes(Field::from_bytes(8, &[9, 8, 7]).unwrap())]
    fn test_round_trip_without_metadata(#[case] field: Field) {
        let mut buf = vec![0u8; field.size()];
        let written = FieldSerializer::serialize(&field, &mut buf, 0, false).unwrap();
        assert_eq!(written, field.size());

        let (actual, consumed) = FieldSerializer::deserialize_with(&buf, 0, field.metafield_ref()).unwrap();
        assert_eq!(consumed, written);
        assert_eq!(actual, field);
    }

    #[test]
    fn test_wire_layout() {
        let field = with_category(Field::from_i32(0x0102, 0x0a0b0c0d), FieldCategory::Payload);
        let mut buf = [0u8; 10];
        FieldSerializer::serialize(&field, &mut buf, 0, true).unwrap();
        assert_eq!(buf, [0x01, 0x02, 1, 0x00, 0x04, 3, 0x0a, 0x0b, 0x0c, 0x0d]);
    }

    #[test]
    fn test_single_byte_verbatim() {
        let mut buf = [0u8; 1];
        FieldSerializer::serialize(&Field::from_u8(1, 0x81), &mut buf, 0, false).unwrap();
        assert_eq!(buf, [0x81]);
    }

    #[test]
    fn test_unset_size_consumes_remainder() {
        let mut buf = vec![0u8, 0, 4, 0xff, 0xff, 0];
        buf.extend_from_slice(b"rest of buffer");

        let (field, consumed) = FieldSerializer::deserialize(&buf, 0).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(field.bytes(), b"rest of buffer");
        assert_eq!(field.size(), 14);
        assert!(field.matches(&Metafield::with_type(0, FieldType::ByteArray)));
    }

    #[test]
    fn test_deserialize_with_unset_descriptor() {
        let buf = b"xxabcdef";
        let descriptor = Metafield::with_type(3, FieldType::String);
        assert_eq!(descriptor.size(), SIZE_UNSET);

        let (field, consumed) = FieldSerializer::deserialize_with(buf, 2, &descriptor).unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(field.as_string().unwrap(), "abcdef");
    }

    #[test]
    fn test_descriptor_position_is_kept() {
        let mut descriptor = Metafield::with_size(3, FieldType::Integral, 2).unwrap();
        descriptor.set_position(Some(4));
        let (field, _) = FieldSerializer::deserialize_with(&[0, 7], 0, &descriptor).unwrap();
        assert_eq!(field.metafield_ref().position(), Some(4));
        assert_eq!(field.as_i16().unwrap(), 7);
    }

    #[test]
    fn test_empty_value_is_zero_padded() {
        let field = Field::new(Metafield::with_size(1, FieldType::Integral, 4).unwrap());
        let mut buf = [0xffu8; 4];
        FieldSerializer::serialize(&field, &mut buf, 0, false).unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[rstest]
    #[case::empty(0, 0)]
    #[case::at_end(4, 4)]
    #[case::beyond(4, 17)]
    fn test_index_out_of_range(#[case] buf_len: usize, #[case] index: usize) {
        let mut buf = vec![0u8; buf_len];
        let field = Field::from_u8(1, 1);
        assert!(matches!(FieldSerializer::serialize(&field, &mut buf, index, true), Err(DatagramError::OutOfRange { .. })));
        assert!(matches!(FieldSerializer::deserialize(&buf, index), Err(DatagramError::OutOfRange { .. })));
        assert!(matches!(FieldSerializer::deserialize_with(&buf, index, field.metafield_ref()), Err(DatagramError::OutOfRange { .. })));
    }

    #[test]
    fn test_serialize_does_not_fit() {
        let mut buf = [0xeeu8; 8];
        let result = FieldSerializer::serialize(&Field::from_i64(1, 1), &mut buf, 2, false);
        assert!(matches!(result, Err(DatagramError::Serialization { .. })));
        assert_eq!(buf, [0xee; 8]);
    }

    #[rstest]
    #[case::short_header(vec![0, 1, 1])]
    #[case::short_payload(vec![0, 1, 1, 0, 4, 0, 1, 2])]
    #[case::bad_type(vec![0, 1, 9, 0, 1, 0, 1])]
    #[case::bad_category(vec![0, 1, 1, 0, 1, 7, 1])]
    #[case::bad_size(vec![0, 1, 1, 0, 3, 0, 1, 2, 3])]
    fn test_deserialize_malformed(#[case] buf: Vec<u8>) {
        match FieldSerializer::deserialize(&buf, 0) {
            Err(DatagramError::Serialization { .. }) => {}
            other => panic!("expected serialization failure, was {:?}", other),
        }
    }
}
