use rustc_hash::FxHashSet;

use crate::datagram::{Datagram, FieldSequence};
use crate::error::{DatagramError, Result};
use crate::field::{FieldCategory, Metafield, ReadOnlyMetafield};
use crate::util::safe_converter::SafeCast;

/// A fixed payload layout, registered explicitly by the application.
///
/// Entries are ordered by their registered position. Entries of category
///  [FieldCategory::Header] describe framing bytes on the wire (e.g. the IP header on a raw
///  socket) - they are skipped when decoding and are not part of datagrams. All other entries are
///  'payload entries', and each carries its index among payload entries as a position hint.
#[derive(Debug, Clone)]
pub struct PayloadDescriptor {
    entries: Vec<Metafield>,
}

#[derive(Debug, Default)]
pub struct PayloadDescriptorBuilder {
    entries: Vec<(usize, Metafield)>,
}

impl PayloadDescriptorBuilder {
    pub fn entry(mut self, position: usize, meta: Metafield) -> PayloadDescriptorBuilder {
        self.entries.push((position, meta));
        self
    }

    pub fn build(mut self) -> Result<PayloadDescriptor> {
        if self.entries.is_empty() {
            return Err(DatagramError::MissingArgument("payload descriptor entries"));
        }

        let mut positions = FxHashSet::default();
        for (position, _) in &self.entries {
            if !positions.insert(*position) {
                return Err(DatagramError::InvalidValue(format!("duplicate descriptor position {}", position)));
            }
        }

        self.entries.sort_by_key(|(position, _)| *position);

        let mut payload_index = 0;
        let entries = self.entries.into_iter()
            .map(|(_, mut meta)| {
                if meta.category() == FieldCategory::Header {
                    meta.set_position(None);
                }
                else {
                    meta.set_position(Some(payload_index));
                    payload_index += 1;
                }
                meta
            })
            .collect();

        Ok(PayloadDescriptor { entries })
    }
}

impl PayloadDescriptor {
    pub fn builder() -> PayloadDescriptorBuilder {
        Default::default()
    }

    /// all entries in wire order, header entries included
    pub fn entries(&self) -> &[Metafield] {
        &self.entries
    }

    pub fn payload_entries(&self) -> impl Iterator<Item = &Metafield> {
        self.entries.iter()
            .filter(|m| m.category() != FieldCategory::Header)
    }

    pub fn entry(&self, index: usize) -> Option<ReadOnlyMetafield<'_>> {
        self.entries.get(index)
            .map(|m| m.as_read_only())
    }

    pub fn get_by_id(&self, id: u16) -> Option<ReadOnlyMetafield<'_>> {
        self.entries.iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_read_only())
    }

    /// The number of bytes of one record on the wire, or `None` if an entry has no fixed size
    pub fn record_len(&self) -> Option<usize> {
        self.entries.iter()
            .map(|m| if m.is_size_unset() {
                None
            }
            else {
                Some(m.size().safe_cast())
            })
            .sum()
    }

    /// Checks that `datagram` has exactly one field per payload entry, each matching its entry
    pub fn validate(&self, datagram: &dyn FieldSequence) -> Result<()> {
        let snapshot: Datagram = datagram.snapshot();

        let expected = self.payload_entries().count();
        if snapshot.len() != expected {
            return Err(DatagramError::InvalidValue(format!("datagram has {} fields, descriptor has {} payload entries", snapshot.len(), expected)));
        }

        for (field, meta) in snapshot.iter().zip(self.payload_entries()) {
            if !field.matches(meta) {
                return Err(DatagramError::InvalidValue(format!("field {:?} does not match descriptor entry {:?}", field.metafield_ref(), meta)));
            }
            if !meta.is_size_unset() && field.size() != meta.size().safe_cast() {
                return Err(DatagramError::InvalidValue(format!("field {} has {} bytes, descriptor entry has {}", field.id(), field.size(), meta.size())));
            }
        }
        Ok(())
    }
}
