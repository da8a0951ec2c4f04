//! Helpers for building test datagrams and for exercising the transport without real sockets.

pub mod datagram;
pub mod socket;
