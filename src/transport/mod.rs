//! Sending and receiving datagrams over IP sockets.
//!
//! [IpClient] owns a socket ([DatagramSocket]), encodes outgoing datagrams with a
//!  [DatagramCodec], shapes outgoing traffic with a [BandwidthManager] and runs a listener
//!  thread that decodes incoming payloads and passes them to registered handlers.

mod bandwidth;
mod codec;
mod config;
mod descriptor;
mod ip_client;
mod listener;
mod socket;

pub use bandwidth::{BandwidthManager, UNLIMITED};
pub use codec::DatagramCodec;
pub use config::{IpClientConfig, SocketKind, MAX_UDP_PAYLOAD};
pub use descriptor::{PayloadDescriptor, PayloadDescriptorBuilder};
pub use ip_client::IpClient;
pub use listener::{FailureHandler, ReceiveHandler, SubscriptionId};
pub use socket::{DatagramSocket, IpSocket, MulticastInterface, SocketOption};

#[cfg(test)]
pub use socket::MockDatagramSocket;
