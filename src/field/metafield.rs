use std::fmt::{Debug, Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{DatagramError, Result};

/// Size value meaning "not set": a field with this size extends to the end of the buffer
///  it is read from.
pub const SIZE_UNSET: u16 = u16::MAX;

/// The size a primitive field gets if its type is set without an explicit size
pub const DEFAULT_PRIMITIVE_SIZE: u16 = 4;

#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum FieldType {
    #[default]
    Undefined = 0,
    /// signed integers of 1, 2, 4 or 8 bytes (1 byte values are treated as unsigned)
    Integral = 1,
    /// IEEE 754 single or double precision
    FloatingPoint = 2,
    /// UTF-8
    String = 3,
    ByteArray = 4,
}
impl FieldType {
    pub fn is_primitive(&self) -> bool {
        matches!(self, FieldType::Integral | FieldType::FloatingPoint)
    }

    fn default_size(&self) -> u16 {
        match self {
            FieldType::Undefined => 0,
            FieldType::Integral | FieldType::FloatingPoint => DEFAULT_PRIMITIVE_SIZE,
            FieldType::String | FieldType::ByteArray => SIZE_UNSET,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum FieldCategory {
    #[default]
    Undefined = 0,
    /// the self-indexing table of a datagram, see [crate::datagram::manifest]
    Manifest = 1,
    /// framing bytes of a fixed protocol layout (e.g. an IP header on a raw socket) - these
    ///  are never part of a datagram's fields
    Header = 2,
    Payload = 3,
}

/// A [Metafield] describes a field independently of its value: id, type, size on the wire and
///  category.
///
/// Sizes are validated against the type: integral fields have 1, 2, 4 or 8 bytes, floating
///  point fields 4 or 8, string and byte array fields anything from 0 to 65535 where 65535 is
///  [SIZE_UNSET]. Undefined fields have no payload. Header fields must not be empty.
///
/// The optional position is a hint for lookup in datagrams with a statically known layout, it
///  does not take part in equality.
#[derive(Clone, Default)]
pub struct Metafield {
    id: u16,
    field_type: FieldType,
    size: u16,
    category: FieldCategory,
    position: Option<usize>,
}

impl Metafield {
    pub fn new(id: u16) -> Metafield {
        Metafield {
            id,
            ..Default::default()
        }
    }

    pub fn with_type(id: u16, field_type: FieldType) -> Metafield {
        Metafield {
            id,
            field_type,
            size: field_type.default_size(),
            ..Default::default()
        }
    }

    pub fn with_size(id: u16, field_type: FieldType, size: u16) -> Result<Metafield> {
        Self::with_category(id, field_type, size, FieldCategory::Undefined)
    }

    pub fn with_category(id: u16, field_type: FieldType, size: u16, category: FieldCategory) -> Result<Metafield> {
        Self::validate(field_type, size, category)?;
        Ok(Metafield {
            id,
            field_type,
            size,
            category,
            position: None,
        })
    }

    /// Describes a payload without known structure: id 0 and a byte array extending to the end
    ///  of the buffer
    pub const fn default_payload() -> Metafield {
        Metafield {
            id: 0,
            field_type: FieldType::ByteArray,
            size: SIZE_UNSET,
            category: FieldCategory::Payload,
            position: None,
        }
    }

    pub fn validate(field_type: FieldType, size: u16, category: FieldCategory) -> Result<()> {
        let size_ok = match field_type {
            FieldType::Undefined => size == 0,
            FieldType::Integral => matches!(size, 1 | 2 | 4 | 8),
            FieldType::FloatingPoint => matches!(size, 4 | 8),
            FieldType::String | FieldType::ByteArray => true,
        };
        if !size_ok {
            return Err(DatagramError::InvalidValue(format!("size {} is not valid for a field of type {:?}", size, field_type)));
        }
        if category == FieldCategory::Header && size == 0 {
            return Err(DatagramError::InvalidValue("a header field must have a size greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn category(&self) -> FieldCategory {
        self.category
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn is_primitive(&self) -> bool {
        self.field_type.is_primitive()
    }

    pub fn is_size_unset(&self) -> bool {
        self.size == SIZE_UNSET
    }

    pub fn set_id(&mut self, id: u16) {
        self.id = id;
    }

    /// Changing the type resets the size to the type's default. This fails for header fields
    ///  if the default size is zero.
    pub fn set_field_type(&mut self, field_type: FieldType) -> Result<()> {
        let size = field_type.default_size();
        Self::validate(field_type, size, self.category)?;
        self.field_type = field_type;
        self.size = size;
        Ok(())
    }

    pub fn set_size(&mut self, size: u16) -> Result<()> {
        Self::validate(self.field_type, size, self.category)?;
        self.size = size;
        Ok(())
    }

    pub fn set_category(&mut self, category: FieldCategory) -> Result<()> {
        Self::validate(self.field_type, self.size, category)?;
        self.category = category;
        Ok(())
    }

    pub fn set_position(&mut self, position: Option<usize>) {
        self.position = position;
    }

    /// sets type and size together, validating the combination rather than each step
    pub(crate) fn set_shape(&mut self, field_type: FieldType, size: u16) -> Result<()> {
        Self::validate(field_type, size, self.category)?;
        self.field_type = field_type;
        self.size = size;
        Ok(())
    }

    /// for primitive widths that are valid by construction - any category accepts them
    pub(crate) fn set_primitive_shape(&mut self, field_type: FieldType, size: u16) {
        debug_assert!(Self::validate(field_type, size, self.category).is_ok());
        self.field_type = field_type;
        self.size = size;
    }

    pub fn as_read_only(&self) -> ReadOnlyMetafield<'_> {
        ReadOnlyMetafield { inner: self }
    }
}

impl PartialEq for Metafield {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.field_type == other.field_type
            && self.category == other.category
            && (self.size == other.size || self.is_size_unset() || other.is_size_unset())
    }
}

impl Debug for Metafield {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Metafield{{id:{},{:?},size:", self.id, self.field_type)?;
        if self.is_size_unset() {
            write!(f, "unset")?;
        }
        else {
            write!(f, "{}", self.size)?;
        }
        write!(f, ",{:?}", self.category)?;
        if let Some(position) = self.position {
            write!(f, ",@{}", position)?;
        }
        write!(f, "}}")
    }
}

impl Display for Metafield {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// A view of a [Metafield] that exposes all getters but rejects every modification.
#[derive(Clone, Copy)]
pub struct ReadOnlyMetafield<'a> {
    inner: &'a Metafield,
}
impl Debug for ReadOnlyMetafield<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReadOnly({:?})", self.inner)
    }
}

impl <'a> ReadOnlyMetafield<'a> {
    pub fn id(&self) -> u16 {
        self.inner.id()
    }

    pub fn field_type(&self) -> FieldType {
        self.inner.field_type()
    }

    pub fn size(&self) -> u16 {
        self.inner.size()
    }

    pub fn category(&self) -> FieldCategory {
        self.inner.category()
    }

    pub fn position(&self) -> Option<usize> {
        self.inner.position()
    }

    pub fn is_primitive(&self) -> bool {
        self.inner.is_primitive()
    }

    pub fn is_size_unset(&self) -> bool {
        self.inner.is_size_unset()
    }

    pub fn set_id(&mut self, _id: u16) -> Result<()> {
        Err(DatagramError::NotSupported("read-only metafield"))
    }

    pub fn set_field_type(&mut self, _field_type: FieldType) -> Result<()> {
        Err(DatagramError::NotSupported("read-only metafield"))
    }

    pub fn set_size(&mut self, _size: u16) -> Result<()> {
        Err(DatagramError::NotSupported("read-only metafield"))
    }

    pub fn set_category(&mut self, _category: FieldCategory) -> Result<()> {
        Err(DatagramError::NotSupported("read-only metafield"))
    }

    pub fn set_position(&mut self, _position: Option<usize>) -> Result<()> {
        Err(DatagramError::NotSupported("read-only metafield"))
    }

    /// an independent, modifiable copy
    pub fn to_metafield(&self) -> Metafield {
        self.inner.clone()
    }
}

impl PartialEq<Metafield> for ReadOnlyMetafield<'_> {
    fn eq(&self, other: &Metafield) -> bool {
        self.inner == other
    }
}
