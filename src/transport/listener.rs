use std::any::Any;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::anyhow;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::datagram::Datagram;
use crate::error::{DatagramError, Result};
use crate::transport::codec::DatagramCodec;
use crate::transport::socket::DatagramSocket;

pub type SubscriptionId = u64;

/// Application callback for received datagrams. Handlers are called on the listener thread,
///  so they should return quickly.
///
/// Returning an error does not stop the listener, the error is passed on to failure handlers.
pub trait ReceiveHandler: Send + Sync + 'static {
    fn on_datagram(&self, datagram: &Datagram, from: SocketAddr) -> anyhow::Result<()>;
}

impl <F> ReceiveHandler for F
where F: Fn(&Datagram, SocketAddr) -> anyhow::Result<()> + Send + Sync + 'static
{
    fn on_datagram(&self, datagram: &Datagram, from: SocketAddr) -> anyhow::Result<()> {
        self(datagram, from)
    }
}

/// Is notified of everything that goes wrong on the receive path: socket errors, payloads that
///  can not be decoded, and receive handlers that fail or panic.
pub trait FailureHandler: Send + Sync + 'static {
    fn on_failure(&self, error: &DatagramError);
}

impl <F> FailureHandler for F
where F: Fn(&DatagramError) + Send + Sync + 'static
{
    fn on_failure(&self, error: &DatagramError) {
        self(error)
    }
}

#[derive(Default)]
pub(crate) struct Handlers {
    next_id: SubscriptionId,
    receive: Vec<(SubscriptionId, Arc<dyn ReceiveHandler>)>,
    failure: Vec<(SubscriptionId, Arc<dyn FailureHandler>)>,
}

impl Handlers {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_receive(&mut self, handler: Arc<dyn ReceiveHandler>) -> SubscriptionId {
        let id = self.next_id();
        self.receive.push((id, handler));
        id
    }

    pub fn add_failure(&mut self, handler: Arc<dyn FailureHandler>) -> SubscriptionId {
        let id = self.next_id();
        self.failure.push((id, handler));
        id
    }

    /// returns `true` if there was a subscription with the given id
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let len_before = self.receive.len() + self.failure.len();
        self.receive.retain(|(i, _)| *i != id);
        self.failure.retain(|(i, _)| *i != id);
        self.receive.len() + self.failure.len() < len_before
    }

    pub fn has_receive_handlers(&self) -> bool {
        !self.receive.is_empty()
    }

    pub fn clear(&mut self) {
        self.receive.clear();
        self.failure.clear();
    }
}

/// Decodes received payloads and passes them to the registered handlers
pub(crate) struct Dispatcher {
    codec: DatagramCodec,
    handlers: Mutex<Handlers>,
}

impl Dispatcher {
    pub fn new(codec: DatagramCodec) -> Dispatcher {
        Dispatcher {
            codec,
            handlers: Default::default(),
        }
    }

    pub fn handlers(&self) -> &Mutex<Handlers> {
        &self.handlers
    }

    /// Calls all receive handlers for each datagram in `buf`, in registration order. Handlers
    ///  are called without holding the lock, so they can (un)subscribe.
    pub fn dispatch(&self, buf: &[u8], from: SocketAddr) {
        let datagrams = match self.codec.decode(buf) {
            Ok(datagrams) => datagrams,
            Err(e) => {
                self.notify_failure(e.into_serialization(format!("decoding {} bytes from {:?}", buf.len(), from)));
                return;
            }
        };

        let handlers: Vec<Arc<dyn ReceiveHandler>> = self.handlers.lock().receive.iter()
            .map(|(_, h)| h.clone())
            .collect();

        for datagram in &datagrams {
            trace!("dispatching datagram from {:?} to {} handlers: {:?}", from, handlers.len(), datagram);
            for handler in &handlers {
                let outcome = catch_unwind(AssertUnwindSafe(|| handler.on_datagram(datagram, from)));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => self.notify_failure(DatagramError::serialization(format!("receive handler failed for datagram from {:?}", from), e)),
                    Err(panic) => self.notify_failure(DatagramError::serialization(format!("receive handler panicked for datagram from {:?}", from), anyhow!(panic_message(panic.as_ref())))),
                }
            }
        }
    }

    pub fn notify_failure(&self, error: DatagramError) {
        warn!("receive failure: {}", ErrorChain(&error));

        let handlers: Vec<Arc<dyn FailureHandler>> = self.handlers.lock().failure.iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler.on_failure(&error))).is_err() {
                error!("failure handler panicked");
            }
        }
    }
}

/// renders an error with its chain of causes
pub(crate) struct ErrorChain<'a>(pub &'a DatagramError);

impl std::fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = std::error::Error::source(self.0);
        while let Some(cause) = source {
            write!(f, ": {}", cause)?;
            source = cause.source();
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    }
    else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    }
    else {
        "(no message)".to_string()
    }
}

/// The background receive loop. It polls the socket with a timeout so that it notices
///  cancellation within one poll interval.
pub(crate) struct Listener {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Listener {
    pub fn start(socket: Arc<dyn DatagramSocket>, dispatcher: Arc<Dispatcher>, poll_timeout: Duration, receive_buffer_len: usize) -> Result<Listener> {
        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name("datagram-listener".to_string())
            .spawn(move || Self::run(socket, dispatcher, poll_timeout, receive_buffer_len, thread_cancel))?;

        Ok(Listener { cancel, handle })
    }

    fn run(socket: Arc<dyn DatagramSocket>, dispatcher: Arc<Dispatcher>, poll_timeout: Duration, receive_buffer_len: usize, cancel: Arc<AtomicBool>) {
        let local_addr = socket.local_addr().ok();
        info!("listener started on {:?}", local_addr);

        let mut buf = vec![0u8; receive_buffer_len];
        while !cancel.load(Ordering::Acquire) {
            match socket.receive(&mut buf, poll_timeout) {
                Ok(None) => {}
                Ok(Some((len, from))) => {
                    if cancel.load(Ordering::Acquire) {
                        break;
                    }
                    dispatcher.dispatch(&buf[..len], from);
                }
                Err(e) => {
                    if cancel.load(Ordering::Acquire) {
                        break;
                    }
                    error!("error receiving on {:?}: {}", local_addr, e);
                    dispatcher.notify_failure(DatagramError::Io(e));
                    // avoid spinning on a persistent socket error
                    thread::sleep(poll_timeout);
                }
            }
        }

        info!("listener stopped on {:?}", local_addr);
    }

    /// Signals cancellation and waits for the thread to finish, unless this is called from the
    ///  listener thread itself
    pub fn stop(self) {
        self.cancel.store(true, Ordering::Release);

        if thread::current().id() == self.handle.thread().id() {
            debug!("listener stopped from its own thread - not joining");
            return;
        }
        if self.handle.join().is_err() {
            error!("listener thread panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
