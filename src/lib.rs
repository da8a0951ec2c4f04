//! A self-describing binary datagram protocol and the IP socket transport that carries it.
//!
//! * [field] has the typed field model ([field::Metafield], [field::Field]) and the
//!    wire codec for a single field ([field::FieldSerializer])
//! * [datagram] has the ordered field container, its decorators and the manifest that makes
//!    a payload randomly addressable by field id
//! * [transport] has the client that sends and receives datagrams over IP sockets, with a
//!    background receive loop and software bandwidth shaping

pub mod checksum;
pub mod datagram;
pub mod error;
pub mod field;
pub mod transport;
pub mod util;

#[cfg(test)]
pub mod test_util;
