use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::datagram::FieldSequence;
use crate::error::{DatagramError, Result};
use crate::transport::bandwidth::BandwidthManager;
use crate::transport::codec::DatagramCodec;
use crate::transport::config::IpClientConfig;
use crate::transport::listener::{Dispatcher, FailureHandler, Listener, ReceiveHandler, SubscriptionId};
use crate::transport::socket::{DatagramSocket, IpSocket, MulticastInterface, SocketOption};

/// Socket state, guarded by the 'socket lock'
struct Connection {
    /// `None` after the client was disposed
    socket: Option<Arc<dyn DatagramSocket>>,
    /// the client is 'active' if it is connected to a remote address
    remote_addr: Option<SocketAddr>,
}

/// Sends and receives datagrams over an IP socket.
///
/// A client is either 'idle' and sends to explicit destinations with [IpClient::send_to], or
///  'active' (after [IpClient::connect]) and sends to its remote address with [IpClient::send].
///
/// Received datagrams are passed to handlers registered with [IpClient::subscribe]. The first
///  subscription starts a background listener thread, removing the last one stops it.
///
/// All operations fail with [DatagramError::Disposed] after [IpClient::dispose], which is also
///  called when the client is dropped.
pub struct IpClient {
    local_addr: SocketAddr,
    codec: DatagramCodec,
    poll_timeout: Duration,
    receive_buffer_len: usize,

    disposed: AtomicBool,
    connection: Mutex<Connection>,
    dispatcher: Arc<Dispatcher>,
    listener: Mutex<Option<Listener>>,

    unicast_bandwidth: Mutex<BandwidthManager>,
    multicast_bandwidth: Mutex<BandwidthManager>,
}

impl std::fmt::Debug for IpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IpClient{{local:{:?},remote:{:?}", self.local_addr, self.remote_addr())?;
        if self.is_disposed() {
            write!(f, ",disposed")?;
        }
        write!(f, "}}")
    }
}

impl IpClient {
    /// Binds a socket to the configured local address, and connects it if a remote address is
    ///  configured
    pub fn new(config: IpClientConfig) -> Result<IpClient> {
        config.validate()?;
        let socket = IpSocket::bind(config.local_addr, config.socket_kind)?;
        Self::with_socket(config, Arc::new(socket))
    }

    pub fn with_socket(config: IpClientConfig, socket: Arc<dyn DatagramSocket>) -> Result<IpClient> {
        config.validate()?;

        let local_addr = socket.local_addr()?;
        if let Some(remote_addr) = config.remote_addr {
            socket.connect(remote_addr)?;
        }
        info!("datagram client bound to {:?}, remote address {:?}", local_addr, config.remote_addr);

        let codec = DatagramCodec::new(&config);
        Ok(IpClient {
            local_addr,
            codec: codec.clone(),
            poll_timeout: config.poll_timeout,
            receive_buffer_len: config.receive_buffer_len,
            disposed: AtomicBool::new(false),
            connection: Mutex::new(Connection {
                socket: Some(socket),
                remote_addr: config.remote_addr,
            }),
            dispatcher: Arc::new(Dispatcher::new(codec)),
            listener: Mutex::new(None),
            unicast_bandwidth: Mutex::new(BandwidthManager::new(config.unicast_bandwidth)),
            multicast_bandwidth: Mutex::new(BandwidthManager::new(config.multicast_bandwidth)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.connection.lock().remote_addr
    }

    pub fn is_active(&self) -> bool {
        self.remote_addr().is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn check_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(DatagramError::Disposed);
        }
        Ok(())
    }

    /// the socket, checked under the socket lock
    fn socket(&self) -> Result<Arc<dyn DatagramSocket>> {
        self.connection.lock().socket.clone()
            .ok_or(DatagramError::Disposed)
    }

    fn check_address_family(&self, addr: IpAddr) -> Result<()> {
        if addr.is_ipv4() != self.local_addr.is_ipv4() {
            return Err(DatagramError::InvalidValue(format!("address {} does not match the address family of local address {}", addr, self.local_addr)));
        }
        Ok(())
    }

    /// Connects to `remote_addr`, making the client active
    pub fn connect(&self, remote_addr: SocketAddr) -> Result<()> {
        self.check_disposed()?;
        self.check_address_family(remote_addr.ip())?;

        let mut connection = self.connection.lock();
        let socket = connection.socket.as_ref().ok_or(DatagramError::Disposed)?;
        socket.connect(remote_addr)?;
        connection.remote_addr = Some(remote_addr);
        debug!("{:?} connected to {:?}", self.local_addr, remote_addr);
        Ok(())
    }

    /// Sends a datagram to the connected remote address, returning the number of bytes written
    pub fn send(&self, datagram: &dyn FieldSequence) -> Result<usize> {
        self.check_disposed()?;
        let (socket, remote_addr) = {
            let connection = self.connection.lock();
            let socket = connection.socket.clone().ok_or(DatagramError::Disposed)?;
            let remote_addr = connection.remote_addr
                .ok_or(DatagramError::InvalidState("send() requires a connected client, use send_to()"))?;
            (socket, remote_addr)
        };

        let buf = self.codec.encode(datagram)?;
        self.throttle(remote_addr.ip(), buf.len());
        let written = socket.send(&buf)?;
        trace!("sent {} bytes to {:?}", written, remote_addr);
        Ok(written)
    }

    /// Sends a datagram to `to`, returning the number of bytes written. This requires the client
    ///  to be idle.
    pub fn send_to(&self, datagram: &dyn FieldSequence, to: SocketAddr) -> Result<usize> {
        self.check_disposed()?;
        let socket = {
            let connection = self.connection.lock();
            let socket = connection.socket.clone().ok_or(DatagramError::Disposed)?;
            if connection.remote_addr.is_some() {
                return Err(DatagramError::InvalidState("send_to() is not available on a connected client, use send()"));
            }
            socket
        };

        let buf = self.codec.encode(datagram)?;
        self.throttle(to.ip(), buf.len());
        let written = socket.send_to(&buf, to)?;
        trace!("sent {} bytes to {:?}", written, to);
        Ok(written)
    }

    fn throttle(&self, destination: IpAddr, buffer_len: usize) {
        let is_group = match destination {
            IpAddr::V4(addr) => addr.is_multicast() || addr.is_broadcast(),
            IpAddr::V6(addr) => addr.is_multicast(),
        };
        let bandwidth = if is_group {
            &self.multicast_bandwidth
        }
        else {
            &self.unicast_bandwidth
        };
        bandwidth.lock().throttle(buffer_len);
    }

    /// bits per second for unicast destinations, [crate::transport::UNLIMITED] for no shaping
    pub fn set_unicast_bandwidth(&self, bits_per_second: u64) -> Result<()> {
        self.check_disposed()?;
        self.unicast_bandwidth.lock().set_bits_per_second(bits_per_second);
        Ok(())
    }

    /// bits per second for multicast and broadcast destinations, [crate::transport::UNLIMITED]
    ///  for no shaping
    pub fn set_multicast_bandwidth(&self, bits_per_second: u64) -> Result<()> {
        self.check_disposed()?;
        self.multicast_bandwidth.lock().set_bits_per_second(bits_per_second);
        Ok(())
    }

    /// Registers a handler for received datagrams. The first subscription starts the listener.
    pub fn subscribe(&self, handler: impl ReceiveHandler) -> Result<SubscriptionId> {
        self.check_disposed()?;
        let id = self.dispatcher.handlers().lock().add_receive(Arc::new(handler));
        debug!("added receive handler {}", id);
        self.ensure_listener()?;
        Ok(id)
    }

    /// Registers a handler for failures on the receive path
    pub fn subscribe_failures(&self, handler: impl FailureHandler) -> Result<SubscriptionId> {
        self.check_disposed()?;
        let id = self.dispatcher.handlers().lock().add_failure(Arc::new(handler));
        debug!("added failure handler {}", id);
        Ok(id)
    }

    /// Removes a receive or failure handler, returning `false` if there was no handler with the
    ///  given id. Removing the last receive handler stops the listener.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.check_disposed()?;
        let removed = self.dispatcher.handlers().lock().remove(id);
        if removed {
            debug!("removed handler {}", id);
        }
        self.stop_listener_if_unused();
        Ok(removed)
    }

    pub fn is_listening(&self) -> bool {
        self.listener.lock().as_ref()
            .map_or(false, |l| !l.is_finished())
    }

    fn ensure_listener(&self) -> Result<()> {
        let mut listener = self.listener.lock();
        if listener.is_some() || !self.dispatcher.handlers().lock().has_receive_handlers() {
            return Ok(());
        }
        *listener = Some(Listener::start(self.socket()?, self.dispatcher.clone(), self.poll_timeout, self.receive_buffer_len)?);
        Ok(())
    }

    fn stop_listener_if_unused(&self) {
        let listener = {
            let mut listener = self.listener.lock();
            if self.dispatcher.handlers().lock().has_receive_handlers() {
                return;
            }
            listener.take()
        };
        // joining happens outside the lock so that a handler can unsubscribe without deadlock
        if let Some(listener) = listener {
            listener.stop();
        }
    }

    fn check_multicast(&self, group: IpAddr, interface: MulticastInterface) -> Result<()> {
        if !group.is_multicast() {
            return Err(DatagramError::InvalidValue(format!("{} is not a multicast address", group)));
        }
        self.check_address_family(group)?;
        let interface_matches = matches!((group, interface), (IpAddr::V4(_), MulticastInterface::V4(_)) | (IpAddr::V6(_), MulticastInterface::V6(_)));
        if !interface_matches {
            return Err(DatagramError::InvalidValue(format!("interface {:?} does not match the address family of group {}", interface, group)));
        }
        Ok(())
    }

    pub fn join_multicast(&self, group: IpAddr, interface: MulticastInterface) -> Result<()> {
        self.check_disposed()?;
        self.check_multicast(group, interface)?;

        let connection = self.connection.lock();
        let socket = connection.socket.as_ref().ok_or(DatagramError::Disposed)?;
        socket.join_multicast(group, interface)?;
        info!("{:?} joined multicast group {} on {:?}", self.local_addr, group, interface);
        Ok(())
    }

    pub fn leave_multicast(&self, group: IpAddr, interface: MulticastInterface) -> Result<()> {
        self.check_disposed()?;
        self.check_multicast(group, interface)?;

        let connection = self.connection.lock();
        let socket = connection.socket.as_ref().ok_or(DatagramError::Disposed)?;
        socket.leave_multicast(group, interface)?;
        info!("{:?} left multicast group {} on {:?}", self.local_addr, group, interface);
        Ok(())
    }

    fn option(&self, option: SocketOption) -> Result<u32> {
        self.check_disposed()?;
        let connection = self.connection.lock();
        let socket = connection.socket.as_ref().ok_or(DatagramError::Disposed)?;
        Ok(socket.option(option)?)
    }

    fn set_option(&self, option: SocketOption, value: u32) -> Result<()> {
        self.check_disposed()?;
        let connection = self.connection.lock();
        let socket = connection.socket.as_ref().ok_or(DatagramError::Disposed)?;
        socket.set_option(option, value)?;
        debug!("set {:?} to {} on {:?}", option, value, self.local_addr);
        Ok(())
    }

    fn check_u8_range(what: &'static str, value: u32) -> Result<()> {
        if value > u8::MAX as u32 {
            return Err(DatagramError::OutOfRange { what, value: value as u64, allowed: "0..=255" });
        }
        Ok(())
    }

    pub fn receive_buffer_size(&self) -> Result<u32> {
        self.option(SocketOption::ReceiveBufferSize)
    }

    pub fn set_receive_buffer_size(&self, size: u32) -> Result<()> {
        self.set_option(SocketOption::ReceiveBufferSize, size)
    }

    pub fn send_buffer_size(&self) -> Result<u32> {
        self.option(SocketOption::SendBufferSize)
    }

    pub fn set_send_buffer_size(&self, size: u32) -> Result<()> {
        self.set_option(SocketOption::SendBufferSize, size)
    }

    pub fn ttl(&self) -> Result<u32> {
        self.option(SocketOption::Ttl)
    }

    pub fn set_ttl(&self, ttl: u32) -> Result<()> {
        Self::check_u8_range("ttl", ttl)?;
        self.set_option(SocketOption::Ttl, ttl)
    }

    pub fn type_of_service(&self) -> Result<u32> {
        self.option(SocketOption::TypeOfService)
    }

    pub fn set_type_of_service(&self, tos: u32) -> Result<()> {
        Self::check_u8_range("type of service", tos)?;
        self.set_option(SocketOption::TypeOfService, tos)
    }

    pub fn broadcast(&self) -> Result<bool> {
        Ok(self.option(SocketOption::Broadcast)? != 0)
    }

    pub fn set_broadcast(&self, broadcast: bool) -> Result<()> {
        self.set_option(SocketOption::Broadcast, broadcast as u32)
    }

    pub fn multicast_loop(&self) -> Result<bool> {
        Ok(self.option(SocketOption::MulticastLoop)? != 0)
    }

    pub fn set_multicast_loop(&self, multicast_loop: bool) -> Result<()> {
        self.set_option(SocketOption::MulticastLoop, multicast_loop as u32)
    }

    pub fn multicast_ttl(&self) -> Result<u32> {
        self.option(SocketOption::MulticastTtl)
    }

    pub fn set_multicast_ttl(&self, ttl: u32) -> Result<()> {
        Self::check_u8_range("multicast ttl", ttl)?;
        self.set_option(SocketOption::MulticastTtl, ttl)
    }

    /// Removes all handlers, stops the listener and releases the socket. Calling this more than
    ///  once has no effect.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.dispatcher.handlers().lock().clear();
        self.stop_listener_if_unused();
        self.connection.lock().socket = None;

        info!("datagram client on {:?} disposed", self.local_addr);
    }
}

impl Drop for IpClient {
    fn drop(&mut self) {
        self.dispose();
    }
}
