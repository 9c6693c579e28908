//! Packet sink and source interfaces
//!
//! The seams between traffic producers (pcap readers, raw sockets),
//! consumers (writers, processors, encapsulators) and the router.

use crate::buffer::{BufferView, BufferWritableView};
use crate::error::NetResult;

/// User data passed along with each Ethernet frame or IPv4 packet.
///
/// The library core gives it no meaning; sinks and hooks are free to
/// read and write it (the GTP encapsulation sink tags the traffic
/// direction here).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextUserData {
    pub int_value: i32,
}

/// Consumes IPv4 packets one at a time.
///
/// Consuming an empty view is legitimate; what to do with it is up to
/// the implementation.
pub trait Ipv4PacketSink {
    fn consume_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()>;
}

/// Consumes Ethernet frames one at a time.
///
/// Consuming an empty view is legitimate; what to do with it is up to
/// the implementation.
pub trait EthPacketSink {
    fn consume_eth_packet(
        &mut self,
        eth_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()>;
}

/// A source of IPv4 packets.
pub trait Ipv4PacketSource {
    /// True if a packet can be read
    fn packet_available(&mut self) -> bool;

    /// Read the next packet into `buffer` and return a writable view
    /// over the IPv4 data.
    ///
    /// The returned view may cover a different range of the same
    /// buffer than the one handed in (e.g. a reader may strip an outer
    /// header); an empty view means the record carried no IPv4 data.
    fn read_ipv4_packet<'a>(&mut self, buffer: &'a mut [u8]) -> NetResult<BufferWritableView<'a>>;
}

/// A source of Ethernet frames.
pub trait EthPacketSource {
    /// True if a frame can be read
    fn packet_available(&mut self) -> bool;

    /// Read the next frame into `buffer` and return a writable view
    /// over the Ethernet data.
    ///
    /// The returned view may cover a different range of the same
    /// buffer than the one handed in (e.g. a synthesized Ethernet
    /// header in front of cooked-capture records).
    fn read_eth_packet<'a>(&mut self, buffer: &'a mut [u8]) -> NetResult<BufferWritableView<'a>>;
}

/// An `Ipv4PacketSink` that keeps a copy of the last consumed packet.
///
/// Views cannot legally outlive the consume call, so the tap stores an
/// owned copy.
#[derive(Debug, Default)]
pub struct Ipv4PacketTap {
    last_packet: Vec<u8>,
    last_user_data: ContextUserData,
}

impl Ipv4PacketTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last consumed IPv4 packet (possibly empty)
    pub fn last_packet(&self) -> &[u8] {
        &self.last_packet
    }

    /// The user data seen with the last consumed packet
    pub fn last_user_data(&self) -> ContextUserData {
        self.last_user_data
    }
}

impl Ipv4PacketSink for Ipv4PacketTap {
    fn consume_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        self.last_packet.clear();
        self.last_packet.extend_from_slice(ipv4_data.as_slice());
        self.last_user_data = *user_data;
        Ok(())
    }
}

/// An `EthPacketSink` that keeps a copy of the last consumed frame.
#[derive(Debug, Default)]
pub struct EthPacketTap {
    last_frame: Vec<u8>,
    last_user_data: ContextUserData,
}

impl EthPacketTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last consumed Ethernet frame (possibly empty)
    pub fn last_frame(&self) -> &[u8] {
        &self.last_frame
    }

    /// The user data seen with the last consumed frame
    pub fn last_user_data(&self) -> ContextUserData {
        self.last_user_data
    }
}

impl EthPacketSink for EthPacketTap {
    fn consume_eth_packet(
        &mut self,
        eth_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        self.last_frame.clear();
        self.last_frame.extend_from_slice(eth_data.as_slice());
        self.last_user_data = *user_data;
        Ok(())
    }
}
