//! UPF network library
//!
//! Packet-buffer views and pools, one decoder per protocol layer
//! (Ethernet, IPv4, UDP, TCP, SCTP, GTPv1-U), IPv4 fragment reassembly,
//! GTPv1-U encapsulation builders, the layered packet processor, and the
//! pcap / raw-socket front ends.

pub mod buffer;
pub mod dump;
pub mod encap;
pub mod error;
pub mod eth;
pub mod gtp_u;
pub mod interfaces;
pub mod ipv4;
pub mod pcap;
pub mod pool;
pub mod processor;
pub mod reassembly;
pub mod sctp;
pub mod tcp;
pub mod types;
pub mod udp;

#[cfg(target_os = "linux")]
pub mod rawsock;

// Re-export the types nearly every consumer touches.
pub use buffer::{BufferView, BufferWritableView, DEFAULT_PACKET_BUFFER_SIZE};
pub use error::{NetError, NetResult};
pub use gtp_u::GtpEndpoint;
pub use interfaces::{
    ContextUserData, EthPacketSink, EthPacketSource, Ipv4PacketSink, Ipv4PacketSource,
};
pub use pool::{PacketBufferPool, PooledBuffer};
pub use processor::{Context, EthPacketProcessor, HookTable, PacketHandler};
pub use types::{MacAddr, Teid, TEID_UNSPECIFIED};
