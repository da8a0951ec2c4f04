use std::io;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

#[cfg(test)] use mockall::automock;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tracing::{debug, trace};

use crate::transport::config::SocketKind;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SocketOption {
    ReceiveBufferSize,
    SendBufferSize,
    /// unicast time-to-live (IPv4) or hop limit (IPv6)
    Ttl,
    TypeOfService,
    /// 0 or 1
    Broadcast,
    /// 0 or 1
    MulticastLoop,
    MulticastTtl,
}

/// The local interface for multicast membership: IPv4 identifies interfaces by address, IPv6
///  by index
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MulticastInterface {
    V4(Ipv4Addr),
    V6(u32),
}

/// This is an abstraction over the OS socket, introduced to facilitate mocking the I/O part
///  away for testing
#[cfg_attr(test, automock)]
pub trait DatagramSocket: Send + Sync + 'static {
    fn connect(&self, remote: SocketAddr) -> io::Result<()>;

    /// send to the connected remote address
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    fn send_to(&self, buf: &[u8], to: SocketAddr) -> io::Result<usize>;

    /// Waits for an incoming datagram for at most `timeout`, returning `None` if there was none
    fn receive(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn join_multicast(&self, group: IpAddr, interface: MulticastInterface) -> io::Result<()>;

    fn leave_multicast(&self, group: IpAddr, interface: MulticastInterface) -> io::Result<()>;

    fn option(&self, option: SocketOption) -> io::Result<u32>;

    fn set_option(&self, option: SocketOption, value: u32) -> io::Result<()>;
}

/// [DatagramSocket] implementation for UDP and raw IP sockets
#[derive(Debug)]
pub struct IpSocket {
    socket: UdpSocket,
}

impl IpSocket {
    pub fn bind(local_addr: SocketAddr, kind: SocketKind) -> io::Result<IpSocket> {
        let domain = Domain::for_address(local_addr);
        let socket = match kind {
            SocketKind::Udp => Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?,
            SocketKind::Raw(protocol) => Socket::new(domain, Type::RAW, Some(Protocol::from(protocol as i32)))?,
        };
        socket.set_reuse_address(true)?;
        socket.bind(&local_addr.into())?;

        let socket: UdpSocket = socket.into();
        debug!("bound {:?} socket to {:?}", kind, socket.local_addr());
        Ok(IpSocket { socket })
    }

    fn is_ipv4(&self) -> io::Result<bool> {
        Ok(self.socket.local_addr()?.is_ipv4())
    }
}

fn flag(value: u32) -> bool {
    value != 0
}

fn invalid_input(msg: &'static str) -> io::Error {
    io::Error::new(ErrorKind::InvalidInput, msg)
}

impl DatagramSocket for IpSocket {
    fn connect(&self, remote: SocketAddr) -> io::Result<()> {
        self.socket.connect(remote)
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }

    fn send_to(&self, buf: &[u8], to: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, to)
    }

    fn receive(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>> {
        self.socket.set_read_timeout(Some(timeout))?;
        match self.socket.recv_from(buf) {
            Ok((len, from)) => {
                trace!("received {} bytes from {:?}", len, from);
                Ok(Some((len, from)))
            }
            // timeouts are reported as WouldBlock on Unix and TimedOut on Windows
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn join_multicast(&self, group: IpAddr, interface: MulticastInterface) -> io::Result<()> {
        match (group, interface) {
            (IpAddr::V4(group), MulticastInterface::V4(interface)) => self.socket.join_multicast_v4(&group, &interface),
            (IpAddr::V6(group), MulticastInterface::V6(interface)) => self.socket.join_multicast_v6(&group, interface),
            _ => Err(invalid_input("multicast group and interface must be of the same address family")),
        }
    }

    fn leave_multicast(&self, group: IpAddr, interface: MulticastInterface) -> io::Result<()> {
        match (group, interface) {
            (IpAddr::V4(group), MulticastInterface::V4(interface)) => self.socket.leave_multicast_v4(&group, &interface),
            (IpAddr::V6(group), MulticastInterface::V6(interface)) => self.socket.leave_multicast_v6(&group, interface),
            _ => Err(invalid_input("multicast group and interface must be of the same address family")),
        }
    }

    fn option(&self, option: SocketOption) -> io::Result<u32> {
        let sock_ref = SockRef::from(&self.socket);
        let value = match option {
            SocketOption::ReceiveBufferSize => sock_ref.recv_buffer_size()?.try_into().unwrap_or(u32::MAX),
            SocketOption::SendBufferSize => sock_ref.send_buffer_size()?.try_into().unwrap_or(u32::MAX),
            SocketOption::Ttl => if self.is_ipv4()? {
                self.socket.ttl()?
            }
            else {
                sock_ref.unicast_hops_v6()?
            },
            SocketOption::TypeOfService => sock_ref.tos()?,
            SocketOption::Broadcast => self.socket.broadcast()? as u32,
            SocketOption::MulticastLoop => if self.is_ipv4()? {
                self.socket.multicast_loop_v4()? as u32
            }
            else {
                self.socket.multicast_loop_v6()? as u32
            },
            SocketOption::MulticastTtl => if self.is_ipv4()? {
                self.socket.multicast_ttl_v4()?
            }
            else {
                sock_ref.multicast_hops_v6()?
            },
        };
        Ok(value)
    }

    fn set_option(&self, option: SocketOption, value: u32) -> io::Result<()> {
        let sock_ref = SockRef::from(&self.socket);
        match option {
            SocketOption::ReceiveBufferSize => sock_ref.set_recv_buffer_size(value as usize),
            SocketOption::SendBufferSize => sock_ref.set_send_buffer_size(value as usize),
            SocketOption::Ttl => if self.is_ipv4()? {
                self.socket.set_ttl(value)
            }
            else {
                sock_ref.set_unicast_hops_v6(value)
            },
            SocketOption::TypeOfService => sock_ref.set_tos(value),
            SocketOption::Broadcast => self.socket.set_broadcast(flag(value)),
            SocketOption::MulticastLoop => if self.is_ipv4()? {
                self.socket.set_multicast_loop_v4(flag(value))
            }
            else {
                self.socket.set_multicast_loop_v6(flag(value))
            },
            SocketOption::MulticastTtl => if self.is_ipv4()? {
                self.socket.set_multicast_ttl_v4(value)
            }
            else {
                sock_ref.set_multicast_hops_v6(value)
            },
        }
    }
}
