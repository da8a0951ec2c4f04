//! The complete encode / decode pipeline between datagrams and socket payloads.
//!
//! Encoding writes an optional manifest followed by all fields, with or without headers. Decoding
//!  is tried in this order:
//!
//! 1. a valid manifest as the first field: each listed field is read at its offset, with its
//!     header if metadata is embedded, otherwise using the payload descriptor's entry for its id
//! 2. embedded metadata: header-framed fields to the end of the buffer
//! 3. a payload descriptor: fields at their descriptor offsets, skipping header entries. This is
//!     repeated while a whole record of fixed size remains, so a single payload can yield
//!     several datagrams
//! 4. a single default field spanning the entire payload

use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, trace};

use crate::checksum::ChecksumEngine;
use crate::datagram::{Datagram, FieldSequence, Manifest};
use crate::error::{DatagramError, Result};
use crate::field::{Field, FieldCategory, FieldSerializer, Metafield};
use crate::transport::config::IpClientConfig;
use crate::transport::descriptor::PayloadDescriptor;

#[derive(Debug, Clone)]
pub struct DatagramCodec {
    embed_metadata: bool,
    attach_manifest: bool,
    max_datagram_len: usize,
    payload_descriptor: Option<Arc<PayloadDescriptor>>,
    checksum: Arc<dyn ChecksumEngine>,
}

impl DatagramCodec {
    pub fn new(config: &IpClientConfig) -> DatagramCodec {
        DatagramCodec {
            embed_metadata: config.embed_metadata,
            attach_manifest: config.attach_manifest,
            max_datagram_len: config.max_datagram_len,
            payload_descriptor: config.payload_descriptor.clone(),
            checksum: config.checksum.clone(),
        }
    }

    /// Serializes `datagram` into a buffer of exactly the required length.
    ///
    /// The datagram is snapshotted once, so concurrent modification of a synchronized datagram
    ///  can not produce an inconsistent buffer.
    pub fn encode(&self, datagram: &dyn FieldSequence) -> Result<Vec<u8>> {
        let snapshot = datagram.snapshot();
        if snapshot.is_empty() {
            return Err(DatagramError::InvalidState("an empty datagram can not be sent"));
        }
        if let Some(descriptor) = &self.payload_descriptor {
            descriptor.validate(&snapshot)?;
        }

        let manifest = if self.attach_manifest {
            Some(Manifest::build(&snapshot, self.embed_metadata, self.checksum.as_ref())?)
        }
        else {
            None
        };

        let total_len = manifest.iter().map(|m| FieldSerializer::serialized_len(m, true)).sum::<usize>()
            + snapshot.iter().map(|f| FieldSerializer::serialized_len(f, self.embed_metadata)).sum::<usize>();
        if total_len > self.max_datagram_len {
            return Err(DatagramError::OutOfRange {
                what: "serialized datagram length",
                value: total_len as u64,
                allowed: "0..=max datagram length",
            });
        }

        let mut buf = vec![0u8; total_len];
        let mut index = 0;
        if let Some(manifest) = &manifest {
            index += Self::write_field(manifest, &mut buf, index, true)?;
        }
        for field in &snapshot {
            index += Self::write_field(field, &mut buf, index, self.embed_metadata)?;
        }
        debug_assert_eq!(index, total_len);

        trace!("encoded datagram with {} fields into {} bytes", snapshot.len(), total_len);
        Ok(buf)
    }

    fn write_field(field: &Field, buf: &mut [u8], index: usize, embed_metadata: bool) -> Result<usize> {
        // a field without payload bytes may end up at the very end of the buffer
        if FieldSerializer::serialized_len(field, embed_metadata) == 0 {
            return Ok(0);
        }
        FieldSerializer::serialize(field, buf, index, embed_metadata)
            .map_err(|e| e.into_serialization(format!("encoding field {}", field.id())))
    }

    /// Decodes a received payload into one or more datagrams
    pub fn decode(&self, buf: &[u8]) -> Result<Vec<Datagram>> {
        if buf.is_empty() {
            return Err(DatagramError::serialization("decoding datagram", anyhow!("empty payload")));
        }

        if let Some(datagram) = self.decode_with_manifest(buf)? {
            return Ok(vec![datagram]);
        }
        if self.embed_metadata {
            return Ok(vec![self.decode_embedded(buf)?]);
        }
        if let Some(descriptor) = &self.payload_descriptor {
            return Self::decode_with_descriptor(buf, descriptor);
        }
        Ok(vec![Self::decode_default(buf)?])
    }

    fn decode_with_manifest(&self, buf: &[u8]) -> Result<Option<Datagram>> {
        // anything that does not parse as a header-framed manifest is simply not a manifest
        let Ok((first, manifest_len)) = FieldSerializer::deserialize(buf, 0)
        else {
            return Ok(None);
        };
        let Some(manifest) = Manifest::parse(&first, self.checksum.as_ref())
        else {
            return Ok(None);
        };
        trace!("decoding {} fields using manifest {}", manifest.len(), first.id());

        let mut result = Datagram::new();
        for entry in manifest.entries() {
            let offset = entry.offset as usize;
            if offset < manifest_len {
                return Err(DatagramError::serialization("decoding with manifest", anyhow!("offset {} of field {} points into the manifest", offset, entry.id)));
            }

            let field = if self.embed_metadata {
                FieldSerializer::deserialize(buf, offset)?.0
            }
            else {
                let descriptor = self.payload_descriptor.as_ref()
                    .and_then(|d| d.get_by_id(entry.id))
                    .ok_or_else(|| DatagramError::serialization("decoding with manifest", anyhow!("no descriptor entry for field {}", entry.id)))?;
                Self::read_described(buf, offset, &descriptor.to_metafield())?.0
            };
            result.push(field);
        }
        Ok(Some(result))
    }

    fn decode_embedded(&self, buf: &[u8]) -> Result<Datagram> {
        let mut result = Datagram::new();
        let mut index = 0;
        while index < buf.len() {
            let (field, len) = FieldSerializer::deserialize(buf, index)?;
            index += len;
            result.push(field);
        }
        Ok(result)
    }

    fn decode_with_descriptor(buf: &[u8], descriptor: &PayloadDescriptor) -> Result<Vec<Datagram>> {
        let record_len = descriptor.record_len();

        let mut result = Vec::new();
        let mut index = 0;
        loop {
            let mut datagram = Datagram::new();
            for meta in descriptor.entries() {
                let (field, len) = Self::read_described(buf, index, meta)?;
                index += len;
                if meta.category() != FieldCategory::Header {
                    datagram.push(field);
                }
            }
            result.push(datagram);

            match record_len {
                Some(record_len) if record_len > 0 && buf.len() - index >= record_len => continue,
                _ => break,
            }
        }

        if index < buf.len() {
            debug!("ignoring {} trailing bytes after {} records", buf.len() - index, result.len());
        }
        Ok(result)
    }

    fn decode_default(buf: &[u8]) -> Result<Datagram> {
        let (field, _) = FieldSerializer::deserialize_with(buf, 0, &Metafield::default_payload())?;
        Ok(std::iter::once(field).collect())
    }

    fn read_described(buf: &[u8], index: usize, meta: &Metafield) -> Result<(Field, usize)> {
        if index == buf.len() && (meta.size() == 0 || meta.is_size_unset()) {
            // an empty field at the end of the buffer
            return Ok((Field::new(meta.clone()), 0));
        }
        FieldSerializer::deserialize_with(buf, index, meta)
    }
}
