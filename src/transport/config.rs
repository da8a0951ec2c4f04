use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::checksum::{ChecksumEngine, Crc16};
use crate::error::{DatagramError, Result};
use crate::transport::bandwidth::UNLIMITED;
use crate::transport::descriptor::PayloadDescriptor;

/// The largest UDP payload that fits into an IPv4 packet
pub const MAX_UDP_PAYLOAD: usize = 65_507;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SocketKind {
    Udp,
    /// A raw IP socket for the given IP protocol number. On receive, the payload starts with
    ///  the IP header, which is typically described by [crate::field::FieldCategory::Header]
    ///  entries in the payload descriptor.
    Raw(u8),
}

pub struct IpClientConfig {
    pub local_addr: SocketAddr,
    /// If this is set, the client connects to the remote address on creation
    pub remote_addr: Option<SocketAddr>,
    pub socket_kind: SocketKind,

    /// Whether every field is sent with its header (id, type, size and category). Without
    ///  headers, a receiver needs a manifest, a payload descriptor, or it gets the raw bytes.
    pub embed_metadata: bool,
    /// Whether a manifest is sent as the first field of every datagram
    pub attach_manifest: bool,

    /// This is the granularity at which the listener thread checks for cancellation, and it
    ///  bounds the time `unsubscribe()` and `dispose()` block while stopping the listener.
    pub poll_timeout: Duration,

    /// bits per second for unicast destinations, [UNLIMITED] for no shaping
    pub unicast_bandwidth: u64,
    /// bits per second for multicast and broadcast destinations, [UNLIMITED] for no shaping
    pub multicast_bandwidth: u64,

    /// The largest serialized datagram the client sends
    pub max_datagram_len: usize,
    /// The size of the listener's receive buffer, which bounds the size of received datagrams
    pub receive_buffer_len: usize,

    /// a fixed payload layout, used for validating sent datagrams and for decoding received
    ///  payloads that have neither embedded metadata nor a manifest
    pub payload_descriptor: Option<Arc<PayloadDescriptor>>,
    pub checksum: Arc<dyn ChecksumEngine>,
}

impl Debug for IpClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpClientConfig")
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .field("socket_kind", &self.socket_kind)
            .field("embed_metadata", &self.embed_metadata)
            .field("attach_manifest", &self.attach_manifest)
            .field("poll_timeout", &self.poll_timeout)
            .field("unicast_bandwidth", &self.unicast_bandwidth)
            .field("multicast_bandwidth", &self.multicast_bandwidth)
            .field("max_datagram_len", &self.max_datagram_len)
            .field("receive_buffer_len", &self.receive_buffer_len)
            .field("payload_descriptor", &self.payload_descriptor.is_some())
            .field("checksum", &self.checksum)
            .finish()
    }
}

impl IpClientConfig {
    /// UDP with embedded metadata and no shaping
    pub fn default_udp(local_addr: SocketAddr) -> IpClientConfig {
        IpClientConfig {
            local_addr,
            remote_addr: None,
            socket_kind: SocketKind::Udp,
            embed_metadata: true,
            attach_manifest: false,
            poll_timeout: Duration::from_millis(100),
            unicast_bandwidth: UNLIMITED,
            multicast_bandwidth: UNLIMITED,
            max_datagram_len: MAX_UDP_PAYLOAD,
            receive_buffer_len: MAX_UDP_PAYLOAD,
            payload_descriptor: None,
            checksum: Arc::new(Crc16::ccitt()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(remote_addr) = self.remote_addr {
            if remote_addr.is_ipv4() != self.local_addr.is_ipv4() {
                return Err(DatagramError::InvalidValue(format!("remote address {} does not match the address family of local address {}", remote_addr, self.local_addr)));
            }
        }
        if self.poll_timeout.is_zero() {
            return Err(DatagramError::InvalidValue("poll timeout must be greater than zero".to_string()));
        }
        if self.max_datagram_len == 0 || self.max_datagram_len > u16::MAX as usize {
            return Err(DatagramError::OutOfRange {
                what: "max datagram length",
                value: self.max_datagram_len as u64,
                allowed: "1..=65535",
            });
        }
        if self.receive_buffer_len < self.max_datagram_len {
            return Err(DatagramError::InvalidValue(format!("receive buffer length {} is smaller than max datagram length {}", self.receive_buffer_len, self.max_datagram_len)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    fn local() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[test]
    fn test_default_is_valid() {
        assert!(IpClientConfig::default_udp(local()).validate().is_ok());
    }

    #[rstest]
    #[case::family_mismatch(|c: &mut IpClientConfig| c.remote_addr = Some("[::1]:9000".parse().unwrap()))]
    #[case::zero_poll_timeout(|c: &mut IpClientConfig| c.poll_timeout = Duration::ZERO)]
    #[case::zero_max_len(|c: &mut IpClientConfig| c.max_datagram_len = 0)]
    #[case::max_len_too_big(|c: &mut IpClientConfig| c.max_datagram_len = 70_000)]
    #[case::receive_buffer_too_small(|c: &mut IpClientConfig| c.receive_buffer_len = 100)]
    fn test_invalid(#[case] modify: fn(&mut IpClientConfig)) {
        let mut config = IpClientConfig::default_udp(local());
        modify(&mut config);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_matching_remote() {
        let mut config = IpClientConfig::default_udp(local());
        config.remote_addr = Some(SocketAddr::from(([10, 0, 0, 1], 9000)));
        assert!(config.validate().is_ok());
    }
}
