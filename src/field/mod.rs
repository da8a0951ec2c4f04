//! The field model: a [Metafield] describes a value, a [Field] holds one, and the
//!  [FieldSerializer] moves a field to and from its wire representation.

#[allow(clippy::module_inception)]
mod field;
mod metafield;
mod serializer;

pub use field::{Field, MAX_VALUE_LEN};
pub use metafield::{FieldCategory, FieldType, Metafield, ReadOnlyMetafield, DEFAULT_PRIMITIVE_SIZE, SIZE_UNSET};
pub use serializer::{FieldSerializer, HEADER_SIZE};
