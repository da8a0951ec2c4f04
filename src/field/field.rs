use std::fmt::{Debug, Formatter};

use crate::error::{DatagramError, Result};
use crate::field::metafield::{FieldCategory, FieldType, Metafield, SIZE_UNSET};
use crate::util::safe_converter::{PrecheckedCast, SafeCast};

/// Longest value a string or byte array field can hold - one less than [SIZE_UNSET]
pub const MAX_VALUE_LEN: usize = SIZE_UNSET as usize - 1;

/// A [Field] is a single typed value in a datagram: an optional raw buffer together with the
///  [Metafield] describing it.
///
/// Primitive values are stored in host byte order; conversion to network byte order happens
///  in [crate::field::FieldSerializer]. Setting a value through one of the typed setters
///  adjusts type and size of the metafield to match the value.
#[derive(Clone)]
pub struct Field {
    value: Option<Vec<u8>>,
    meta: Metafield,
}

enum Primitive {
    Int(i64),
    Float(f64),
}

macro_rules! int_getter {
    ($name: ident, $ty: ty) => {
        pub fn $name(&self) -> Result<$ty> {
            Ok(match self.primitive()? {
                None => 0,
                Some(Primitive::Int(v)) => v as $ty,
                Some(Primitive::Float(v)) => v as $ty,
            })
        }
    }
}

macro_rules! float_getter {
    ($name: ident, $ty: ty) => {
        pub fn $name(&self) -> Result<$ty> {
            Ok(match self.primitive()? {
                None => 0.0,
                Some(Primitive::Int(v)) => v as $ty,
                Some(Primitive::Float(v)) => v as $ty,
            })
        }
    }
}

macro_rules! coercing_getter {
    ($name: ident, $getter: ident, $setter: ident, $ty: ty) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let value = self.$getter()?;
            if !self.is_empty() {
                self.$setter(value);
            }
            Ok(value)
        }
    }
}

impl Field {
    /// an empty field for the given descriptor
    pub fn new(meta: Metafield) -> Field {
        Field {
            value: None,
            meta,
        }
    }

    pub fn from_u8(id: u16, value: u8) -> Field {
        let mut result = Field::new(Metafield::new(id));
        result.set_u8(value);
        result
    }

    pub fn from_i16(id: u16, value: i16) -> Field {
        let mut result = Field::new(Metafield::new(id));
        result.set_i16(value);
        result
    }

    pub fn from_i32(id: u16, value: i32) -> Field {
        let mut result = Field::new(Metafield::new(id));
        result.set_i32(value);
        result
    }

    pub fn from_i64(id: u16, value: i64) -> Field {
        let mut result = Field::new(Metafield::new(id));
        result.set_i64(value);
        result
    }

    pub fn from_f32(id: u16, value: f32) -> Field {
        let mut result = Field::new(Metafield::new(id));
        result.set_f32(value);
        result
    }

    pub fn from_f64(id: u16, value: f64) -> Field {
        let mut result = Field::new(Metafield::new(id));
        result.set_f64(value);
        result
    }

    pub fn from_string(id: u16, value: &str) -> Result<Field> {
        let mut result = Field::new(Metafield::with_type(id, FieldType::String));
        result.set_string(value)?;
        Ok(result)
    }

    pub fn from_bytes(id: u16, value: &[u8]) -> Result<Field> {
        let mut result = Field::new(Metafield::with_type(id, FieldType::ByteArray));
        result.set_bytes(value)?;
        Ok(result)
    }

    /// NB: The caller is responsible for `value` being consistent with `meta`
    pub(crate) fn from_parts(meta: Metafield, value: Option<Vec<u8>>) -> Field {
        Field {
            value: value.filter(|v| !v.is_empty()),
            meta,
        }
    }

    pub fn id(&self) -> u16 {
        self.meta.id()
    }

    pub fn field_type(&self) -> FieldType {
        self.meta.field_type()
    }

    pub fn category(&self) -> FieldCategory {
        self.meta.category()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// The number of payload bytes this field occupies on the wire. For a field without a fixed
    ///  size, this is the length of its value.
    pub fn size(&self) -> usize {
        if self.meta.is_size_unset() {
            self.bytes().len()
        }
        else {
            self.meta.size().safe_cast()
        }
    }

    /// a copy of this field's descriptor - modifying it does not affect the field
    pub fn metafield(&self) -> Metafield {
        self.meta.clone()
    }

    pub fn metafield_ref(&self) -> &Metafield {
        &self.meta
    }

    pub fn matches(&self, descriptor: &Metafield) -> bool {
        &self.meta == descriptor
    }

    pub fn set_id(&mut self, id: u16) {
        self.meta.set_id(id);
    }

    pub fn set_category(&mut self, category: FieldCategory) -> Result<()> {
        self.meta.set_category(category)
    }

    pub fn set_position(&mut self, position: Option<usize>) {
        self.meta.set_position(position);
    }

    /// the raw value - host byte order for primitives
    pub fn bytes(&self) -> &[u8] {
        self.value.as_deref().unwrap_or(&[])
    }

    fn primitive(&self) -> Result<Option<Primitive>> {
        let value = match &self.value {
            None => return Ok(None),
            Some(v) => v.as_slice(),
        };

        let result = match (self.meta.field_type(), value.len()) {
            (FieldType::Undefined, _) => None,
            (FieldType::Integral, 1) => Some(Primitive::Int(value[0] as i64)),
            (FieldType::Integral, 2) => Some(Primitive::Int(i16::from_ne_bytes([value[0], value[1]]) as i64)),
            (FieldType::Integral, 4) => Some(Primitive::Int(i32::from_ne_bytes(Self::array(value)?) as i64)),
            (FieldType::Integral, 8) => Some(Primitive::Int(i64::from_ne_bytes(Self::array(value)?))),
            (FieldType::FloatingPoint, 4) => Some(Primitive::Float(f32::from_ne_bytes(Self::array(value)?) as f64)),
            (FieldType::FloatingPoint, 8) => Some(Primitive::Float(f64::from_ne_bytes(Self::array(value)?))),
            (field_type, len) if field_type.is_primitive() => {
                return Err(DatagramError::InvalidValue(format!("{:?} value with {} bytes", field_type, len)));
            }
            (field_type, _) => {
                return Err(DatagramError::InvalidValue(format!("field {} of type {:?} has no primitive value", self.id(), field_type)));
            }
        };
        Ok(result)
    }

    fn array<const N: usize>(value: &[u8]) -> Result<[u8; N]> {
        value.try_into()
            .map_err(|_| DatagramError::InvalidValue(format!("expected {} bytes, was {}", N, value.len())))
    }

    int_getter!(as_u8, u8);
    int_getter!(as_i16, i16);
    int_getter!(as_i32, i32);
    int_getter!(as_i64, i64);
    float_getter!(as_f32, f32);
    float_getter!(as_f64, f64);

    /// the value decoded as UTF-8 - an empty field is an empty string
    pub fn as_string(&self) -> Result<String> {
        String::from_utf8(self.bytes().to_vec())
            .map_err(|e| DatagramError::InvalidValue(format!("field {} is not valid UTF-8: {}", self.id(), e)))
    }

    // The `coerce_to_` accessors read like their `as_` counterparts and then store the value back
    //  at the requested width, so type and size of the metafield follow the last read. Empty
    //  fields stay empty.
    coercing_getter!(coerce_to_u8, as_u8, set_u8, u8);
    coercing_getter!(coerce_to_i16, as_i16, set_i16, i16);
    coercing_getter!(coerce_to_i32, as_i32, set_i32, i32);
    coercing_getter!(coerce_to_i64, as_i64, set_i64, i64);
    coercing_getter!(coerce_to_f32, as_f32, set_f32, f32);
    coercing_getter!(coerce_to_f64, as_f64, set_f64, f64);

    /// reads the value as UTF-8 and turns a non-empty field into a String field
    pub fn coerce_to_string(&mut self) -> Result<String> {
        let value = self.as_string()?;
        if !self.is_empty() {
            self.set_string(&value)?;
        }
        Ok(value)
    }

    /// turns a non-empty field into a ByteArray field, returning its raw value
    pub fn coerce_to_bytes(&mut self) -> Result<Vec<u8>> {
        let value = self.bytes().to_vec();
        if !self.is_empty() {
            self.set_bytes(&value)?;
        }
        Ok(value)
    }

    fn set_primitive<const N: usize>(&mut self, field_type: FieldType, bytes: [u8; N]) {
        self.meta.set_primitive_shape(field_type, N.prechecked_cast());
        self.value = Some(bytes.to_vec());
    }

    pub fn set_u8(&mut self, value: u8) {
        self.set_primitive(FieldType::Integral, [value]);
    }

    pub fn set_i16(&mut self, value: i16) {
        self.set_primitive(FieldType::Integral, value.to_ne_bytes());
    }

    pub fn set_i32(&mut self, value: i32) {
        self.set_primitive(FieldType::Integral, value.to_ne_bytes());
    }

    pub fn set_i64(&mut self, value: i64) {
        self.set_primitive(FieldType::Integral, value.to_ne_bytes());
    }

    pub fn set_f32(&mut self, value: f32) {
        self.set_primitive(FieldType::FloatingPoint, value.to_ne_bytes());
    }

    pub fn set_f64(&mut self, value: f64) {
        self.set_primitive(FieldType::FloatingPoint, value.to_ne_bytes());
    }

    pub fn set_string(&mut self, value: &str) -> Result<()> {
        self.set_non_primitive(FieldType::String, value.as_bytes())
    }

    pub fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.set_non_primitive(FieldType::ByteArray, value)
    }

    fn set_non_primitive(&mut self, field_type: FieldType, value: &[u8]) -> Result<()> {
        if value.len() > MAX_VALUE_LEN {
            return Err(DatagramError::InvalidValue(format!("a field value can have at most {} bytes, was {}", MAX_VALUE_LEN, value.len())));
        }
        self.meta.set_shape(field_type, value.len().prechecked_cast())?;
        self.value = if value.is_empty() {
            None
        }
        else {
            Some(value.to_vec())
        };
        Ok(())
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.meta == other.meta && self.bytes() == other.bytes()
    }
}

impl Debug for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field{{{:?}:", self.meta)?;
        match self.field_type() {
            FieldType::Integral => write!(f, "{:?}", self.as_i64())?,
            FieldType::FloatingPoint => write!(f, "{:?}", self.as_f64())?,
            FieldType::String => write!(f, "{:?}", String::from_utf8_lossy(self.bytes()))?,
            FieldType::ByteArray | FieldType::Undefined => write!(f, "{:02x?}", self.bytes())?,
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[test]
    fn test_i64_max_metafield() {
        let field = Field::from_i64(1, i64::MAX);
        assert_eq!(field.metafield(), Metafield::with_category(1, FieldType::Integral, 8, FieldCategory::Undefined).unwrap());
        assert_eq!(field.as_i64().unwrap(), i64::MAX);
    }

    #[rstest]
    #[case::u8(Field::from_u8(1, 200), FieldType::Integral, 1)]
    #[case::i16(Field::from_i16(1, -2), FieldType::Integral, 2)]
    #[case::i32(Field::from_i32(1, 70000), FieldType::Integral, 4)]
    #[case::i64(Field::from_i64(1, -1), FieldType::Integral, 8)]
    #[case::f32(Field::from_f32(1, 1.5), FieldType::FloatingPoint, 4)]
    #[case::f64(Field::from_f64(1, 2.25), FieldType::FloatingPoint, 8)]
    #[case::string(Field::from_string(1, "abc").unwrap(), FieldType::String, 3)]
    #[case::bytes(Field::from_bytes(1, &[1, 2, 3, 4, 5]).unwrap(), FieldType::ByteArray, 5)]
    fn test_setter_updates_metafield(#[case] field: Field, #[case] field_type: FieldType, #[case] size: usize) {
        assert_eq!(field.field_type(), field_type);
        assert_eq!(field.size(), size);
        assert_eq!(field.bytes().len(), size);
    }

    #[test]
    fn test_setter_reallocates_to_target_width() {
        let mut field = Field::from_i16(4, 300);
        field.set_i64(300);
        assert_eq!(field.bytes().len(), 8);
        assert_eq!(field.size(), 8);
        field.set_u8(7);
        assert_eq!(field.bytes().len(), 1);
        assert_eq!(field.metafield_ref().size(), 1);
    }

    #[rstest]
    #[case::widen_negative(Field::from_i16(1, -300), -300i64)]
    #[case::widen_u8(Field::from_u8(1, 255), 255i64)]
    #[case::from_float(Field::from_f64(1, -7.75), -7i64)]
    fn test_integer_coercion(#[case] field: Field, #[case] expected: i64) {
        assert_eq!(field.as_i64().unwrap(), expected);
    }

    #[test]
    fn test_coercing_read_widens_buffer() {
        let mut field = Field::from_i16(1, 5);
        assert_eq!(field.coerce_to_i64().unwrap(), 5);
        assert_eq!(field.field_type(), FieldType::Integral);
        assert_eq!(field.size(), 8);
        assert_eq!(field.metafield_ref().size(), 8);
        assert_eq!(field, Field::from_i64(1, 5));
    }

    #[test]
    fn test_coercing_read_changes_shape() {
        let mut field = Field::from_i32(2, 0x1234_5678);
        assert_eq!(field.coerce_to_u8().unwrap(), 0x78);
        assert_eq!(field.size(), 1);

        assert_eq!(field.coerce_to_f64().unwrap(), 120.0);
        assert_eq!(field.field_type(), FieldType::FloatingPoint);
        assert_eq!(field.size(), 8);

        assert_eq!(field.coerce_to_i16().unwrap(), 120);
        assert_eq!(field.field_type(), FieldType::Integral);
        assert_eq!(field.size(), 2);
    }

    #[test]
    fn test_coercing_read_of_string_and_bytes() {
        let mut field = Field::from_bytes(3, b"abcd").unwrap();
        assert_eq!(field.coerce_to_string().unwrap(), "abcd");
        assert_eq!(field.field_type(), FieldType::String);
        assert_eq!(field.size(), 4);

        assert_eq!(field.coerce_to_bytes().unwrap(), b"abcd".to_vec());
        assert_eq!(field.field_type(), FieldType::ByteArray);
        assert!(matches!(field.coerce_to_i32(), Err(DatagramError::InvalidValue(_))));
        assert_eq!(field.field_type(), FieldType::ByteArray);
    }

    #[test]
    fn test_coercing_read_of_empty_field() {
        let mut field = Field::new(Metafield::with_type(1, FieldType::ByteArray));
        assert_eq!(field.coerce_to_i32().unwrap(), 0);
        assert_eq!(field.coerce_to_string().unwrap(), "");
        assert!(field.is_empty());
        assert_eq!(field.field_type(), FieldType::ByteArray);
    }

    #[test]
    fn test_narrowing_truncates() {
        let field = Field::from_i32(1, 0x1234_5678);
        assert_eq!(field.as_i16().unwrap(), 0x5678);
        assert_eq!(field.as_u8().unwrap(), 0x78);
    }

    #[test]
    fn test_float_coercion() {
        assert_eq!(Field::from_f32(1, 0.5).as_f64().unwrap(), 0.5);
        assert_eq!(Field::from_i32(1, 3).as_f32().unwrap(), 3.0);
    }

    #[test]
    fn test_primitive_getter_on_non_primitive_fails() {
        let field = Field::from_string(1, "x").unwrap();
        assert!(matches!(field.as_i32(), Err(DatagramError::InvalidValue(_))));
        assert!(matches!(field.as_f64(), Err(DatagramError::InvalidValue(_))));
    }

    #[test]
    fn test_empty_field_reads_zero() {
        let field = Field::new(Metafield::with_type(1, FieldType::ByteArray));
        assert!(field.is_empty());
        assert_eq!(field.as_i32().unwrap(), 0);
        assert_eq!(field.as_f64().unwrap(), 0.0);
        assert_eq!(field.as_string().unwrap(), "");
        assert_eq!(field.bytes(), b"");
    }

    #[test]
    fn test_empty_string_collapses() {
        let mut field = Field::from_string(1, "abc").unwrap();
        field.set_string("").unwrap();
        assert!(field.is_empty());
        assert_eq!(field.size(), 0);
        assert_eq!(field, Field::from_parts(Metafield::with_size(1, FieldType::String, 0).unwrap(), Some(vec![])));
    }

    #[test]
    fn test_too_long_value() {
        let long = vec![0u8; MAX_VALUE_LEN + 1];
        assert!(Field::from_bytes(1, &long).is_err());
        assert!(Field::from_bytes(1, &long[1..]).is_ok());
    }

    #[test]
    fn test_header_field_rejects_empty_value() {
        let mut field = Field::new(Metafield::with_category(1, FieldType::ByteArray, 4, FieldCategory::Header).unwrap());
        assert!(field.set_bytes(b"").is_err());
        assert!(field.set_bytes(b"ab").is_ok());
        assert_eq!(field.category(), FieldCategory::Header);
    }

    #[test]
    fn test_metafield_is_a_copy() {
        let field = Field::from_i32(9, 1);
        let mut meta = field.metafield();
        meta.set_id(10);
        assert_eq!(field.id(), 9);
    }

    #[test]
    fn test_matches() {
        let field = Field::from_string(3, "hello").unwrap();
        assert!(field.matches(&Metafield::with_type(3, FieldType::String)));
        assert!(field.matches(&Metafield::with_size(3, FieldType::String, 5).unwrap()));
        assert!(!field.matches(&Metafield::with_size(3, FieldType::String, 4).unwrap()));
        assert!(!field.matches(&Metafield::with_type(3, FieldType::ByteArray)));
    }

    #[test]
    fn test_eq() {
        assert_eq!(Field::from_i32(1, 5), Field::from_i32(1, 5));
        assert_ne!(Field::from_i32(1, 5), Field::from_i32(1, 6));
        assert_ne!(Field::from_i32(1, 5), Field::from_i64(1, 5));
        assert_eq!(Field::from_bytes(2, b"").unwrap(), Field::new(Metafield::with_size(2, FieldType::ByteArray, 0).unwrap()));
    }

    #[test]
    fn test_string_round_trip() {
        let field = Field::from_string(1, "❤️ äbc").unwrap();
        assert_eq!(field.as_string().unwrap(), "❤️ äbc");
        assert_eq!(field.size(), "❤️ äbc".len());
    }
}
