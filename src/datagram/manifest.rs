//! A manifest is a self-indexing table that can be sent as the first field of a datagram.
//!
//! It is a byte array field of category [FieldCategory::Manifest] holding one 4 byte entry per
//!  field: the field's id in the upper 16 bits and its byte offset in the serialized datagram
//!  in the lower 16 bits (big endian). The manifest's own id is the checksum of its value, which
//!  makes it self-verifying: a receiver can tell a manifest from other data without prior
//!  agreement.
//!
//! Offsets are measured from the start of the serialized datagram. The manifest is always
//!  serialized with a header, so the first field's offset is `HEADER_SIZE + 4 * n`. Offsets
//!  wrap at 65536, which does not matter for UDP payload sizes.
//!
//! Entries are sorted by field id (stable for duplicate ids), except for datagrams that
//!  maintain a custom order - these keep their own order.

use bytes::{Buf, BufMut};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::checksum::ChecksumEngine;
use crate::datagram::datagram::Datagram;
use crate::error::{DatagramError, Result};
use crate::field::{Field, FieldCategory, FieldType, HEADER_SIZE, MAX_VALUE_LEN};
use crate::util::safe_converter::LowBits16;

pub const ENTRY_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ManifestEntry {
    pub id: u16,
    pub offset: u16,
}

impl ManifestEntry {
    fn encode(&self) -> u32 {
        ((self.id as u32) << 16) | self.offset as u32
    }

    fn decode(raw: u32) -> ManifestEntry {
        ManifestEntry {
            id: (raw >> 16) as u16,
            offset: (raw & 0xffff) as u16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    offsets: FxHashMap<u16, u16>,
}

impl Manifest {
    /// the number of bytes a manifest for `num_fields` fields occupies on the wire, header included
    pub fn serialized_len(num_fields: usize) -> usize {
        HEADER_SIZE + ENTRY_SIZE * num_fields
    }

    /// Builds the manifest field for `datagram`, assuming the datagram is serialized right after
    ///  the manifest, with headers if `embed_metadata` is set.
    pub fn build(datagram: &Datagram, embed_metadata: bool, checksum: &dyn ChecksumEngine) -> Result<Field> {
        let value_len = ENTRY_SIZE * datagram.len();
        if value_len > MAX_VALUE_LEN {
            return Err(DatagramError::InvalidValue(format!("too many fields for a manifest: {}", datagram.len())));
        }

        let field_header_len = if embed_metadata { HEADER_SIZE } else { 0 };

        let mut offset = Self::serialized_len(datagram.len());
        let mut entries = Vec::with_capacity(datagram.len());
        for field in datagram {
            entries.push(ManifestEntry { id: field.id(), offset: offset.low_bits_16() });
            offset += field_header_len + field.size();
        }
        if !datagram.is_sorted() {
            entries.sort_by_key(|e| e.id);
        }

        let mut value = Vec::with_capacity(value_len);
        for entry in &entries {
            value.put_u32(entry.encode());
        }

        let id = checksum.checksum(&value);
        trace!("built manifest {} with {} entries", id, entries.len());

        let mut result = Field::from_bytes(id, &value)?;
        result.set_category(FieldCategory::Manifest)?;
        Ok(result)
    }

    /// Interprets `field` as a manifest if it is one: a byte array of category manifest with a
    ///  whole number of entries, and an id that matches the checksum of its value.
    pub fn parse(field: &Field, checksum: &dyn ChecksumEngine) -> Option<Manifest> {
        if field.field_type() != FieldType::ByteArray || field.category() != FieldCategory::Manifest {
            return None;
        }
        let mut value = field.bytes();
        if value.len() % ENTRY_SIZE != 0 {
            return None;
        }
        if checksum.checksum(value) != field.id() {
            trace!("manifest checksum mismatch for field {}", field.id());
            return None;
        }

        let mut entries = Vec::with_capacity(value.len() / ENTRY_SIZE);
        let mut offsets = FxHashMap::default();
        while value.has_remaining() {
            let entry = ManifestEntry::decode(value.get_u32());
            offsets.entry(entry.id).or_insert(entry.offset);
            entries.push(entry);
        }
        Some(Manifest { entries, offsets })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// the offset of the first field with the given id
    pub fn offset_of(&self, id: u16) -> Option<u16> {
        self.offsets.get(&id).copied()
    }
}
