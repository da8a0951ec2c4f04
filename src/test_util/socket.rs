use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::thread;
use std::time::Duration;

use crate::transport::{IpClientConfig, MockDatagramSocket};

pub const MOCK_LOCAL_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 8000));

/// a config for clients on a [MockDatagramSocket], with a short poll timeout
pub fn mock_config() -> IpClientConfig {
    let mut config = IpClientConfig::default_udp(MOCK_LOCAL_ADDR);
    config.poll_timeout = Duration::from_millis(5);
    config
}

/// a config for clients on a real UDP socket bound to an ephemeral loopback port
pub fn loopback_config() -> IpClientConfig {
    let mut config = IpClientConfig::default_udp(SocketAddr::from(([127, 0, 0, 1], 0)));
    config.poll_timeout = Duration::from_millis(20);
    config
}

/// A mock socket with a fixed local address that never receives anything. Receiving blocks for
///  the poll timeout like a real socket would.
pub fn idle_mock_socket() -> MockDatagramSocket {
    let mut socket = MockDatagramSocket::new();
    socket.expect_local_addr()
        .returning(|| Ok(MOCK_LOCAL_ADDR));
    socket.expect_receive()
        .returning(|_, timeout| {
            thread::sleep(timeout);
            Ok(None)
        });
    socket
}
