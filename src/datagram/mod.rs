//! Datagrams: ordered sequences of fields that are sent and received as a unit.

#[allow(clippy::module_inception)]
mod datagram;
mod decorators;
pub mod manifest;
mod sequence;

pub use datagram::{Datagram, FieldComparer};
pub use decorators::{fixed_size, read_only, synchronized, FixedSize, ReadOnly, Synchronized};
pub use manifest::{Manifest, ManifestEntry};
pub use sequence::FieldSequence;
