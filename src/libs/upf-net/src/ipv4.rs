//! IPv4 packet decoding
//!
//! The decoder also exposes the fragment-related accessors used by the
//! RFC 815 reassembly machinery in [`crate::reassembly`].

use std::net::Ipv4Addr;

use crate::buffer::BufferView;
use crate::error::{NetError, NetResult};
use crate::types::ipv4_protocol;

/// Minimum IPv4 header length
pub const IPV4_MIN_HEADER_LEN: usize = 20;

const TOTAL_LENGTH_OFFSET: usize = 2;
const IDENTIFICATION_OFFSET: usize = 4;
const FRAGMENT_OFFSET_OFFSET: usize = 6;
const TTL_OFFSET: usize = 8;
const PROTOCOL_OFFSET: usize = 9;
const CHECKSUM_OFFSET: usize = 10;
const SRC_ADDRESS_OFFSET: usize = 12;
const DST_ADDRESS_OFFSET: usize = 16;

/// Identifies the datagram a fragment belongs to.
///
/// Fragments of the same original datagram share `(src, dst, protocol,
/// identification)`. There is deliberately no `Default`: a key is always
/// derived from a decoded fragment or built explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4FragmentKey {
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub identification: u16,
}

impl Ipv4FragmentKey {
    pub fn new(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, identification: u16) -> Self {
        Ipv4FragmentKey {
            protocol,
            src,
            dst,
            identification,
        }
    }
}

/// A generator of IPv4 `Identification` values.
///
/// Needed when originating new IPv4 traffic, e.g. when encapsulating
/// into GTPv1-U. Inject one explicitly wherever identifications are
/// consumed.
#[derive(Debug, Default, Clone)]
pub struct Ipv4IdentificationSource {
    identification: u16,
}

impl Ipv4IdentificationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from `start` instead of zero.
    pub fn starting_at(start: u16) -> Self {
        Ipv4IdentificationSource {
            identification: start,
        }
    }

    /// Next identification value (wrapping).
    pub fn get(&mut self) -> u16 {
        let id = self.identification;
        self.identification = self.identification.wrapping_add(1);
        id
    }

    /// The value the next call to [`get`](Self::get) will return.
    pub fn peek(&self) -> u16 {
        self.identification
    }
}

/// Decoder for an IPv4 packet or fragment stored in a `BufferView`.
///
/// Construction checks the minimum header length and the version field.
/// The header checksum is not validated.
#[derive(Debug, Clone)]
pub struct Ipv4Decoder<'a> {
    view: BufferView<'a>,
}

impl<'a> Ipv4Decoder<'a> {
    pub fn new(ipv4_data: BufferView<'a>) -> NetResult<Self> {
        const CONTEXT: &str = "Ipv4Decoder::new";

        if ipv4_data.size() < IPV4_MIN_HEADER_LEN {
            return Err(NetError::TooShort {
                needed: IPV4_MIN_HEADER_LEN,
                available: ipv4_data.size(),
                context: CONTEXT,
            });
        }

        let version = ipv4_data.u8_at_nocheck(0) >> 4;
        if version != 4 {
            return Err(NetError::malformed(
                CONTEXT,
                format!("version is {version}, expected 4"),
            ));
        }

        Ok(Ipv4Decoder { view: ipv4_data })
    }

    #[inline]
    pub fn version(&self) -> u8 {
        (self.view.u8_at_nocheck(0) >> 4) & 0x0F
    }

    /// Header length in bytes (IHL * 4)
    #[inline]
    pub fn header_length(&self) -> usize {
        usize::from(self.view.u8_at_nocheck(0) & 0x0F) * 4
    }

    /// The 16-bit total-length header field
    #[inline]
    pub fn total_length(&self) -> usize {
        usize::from(self.view.u16_at_nocheck(TOTAL_LENGTH_OFFSET))
    }

    #[inline]
    pub fn identification(&self) -> u16 {
        self.view.u16_at_nocheck(IDENTIFICATION_OFFSET)
    }

    /// Fragment offset in bytes (13-bit field * 8)
    #[inline]
    pub fn fragment_offset(&self) -> usize {
        usize::from(self.view.u16_at_nocheck(FRAGMENT_OFFSET_OFFSET) & 0x1FFF) * 8
    }

    #[inline]
    pub fn more_fragments(&self) -> bool {
        (self.view.u16_at_nocheck(FRAGMENT_OFFSET_OFFSET) >> 13) & 1 != 0
    }

    #[inline]
    pub fn dont_fragment(&self) -> bool {
        (self.view.u16_at_nocheck(FRAGMENT_OFFSET_OFFSET) >> 14) & 1 != 0
    }

    #[inline]
    pub fn ttl(&self) -> u8 {
        self.view.u8_at_nocheck(TTL_OFFSET)
    }

    #[inline]
    pub fn protocol(&self) -> u8 {
        self.view.u8_at_nocheck(PROTOCOL_OFFSET)
    }

    /// The stored header checksum (not validated)
    #[inline]
    pub fn header_checksum(&self) -> u16 {
        self.view.u16_at_nocheck(CHECKSUM_OFFSET)
    }

    #[inline]
    pub fn src_address(&self) -> Ipv4Addr {
        self.view.ipv4_at_nocheck(SRC_ADDRESS_OFFSET)
    }

    #[inline]
    pub fn dst_address(&self) -> Ipv4Addr {
        self.view.ipv4_at_nocheck(DST_ADDRESS_OFFSET)
    }

    /// Payload length: total length minus header length
    #[inline]
    pub fn data_length(&self) -> usize {
        self.total_length().saturating_sub(self.header_length())
    }

    /// Payload view.
    ///
    /// The payload range derives from the total-length field, which
    /// construction does not pin against the buffer, so this is the one
    /// fallible accessor.
    pub fn data(&self) -> NetResult<BufferView<'a>> {
        self.view.sub_len(self.header_length(), self.data_length())
    }

    #[inline]
    pub fn is_udp(&self) -> bool {
        self.protocol() == ipv4_protocol::UDP
    }

    #[inline]
    pub fn is_tcp(&self) -> bool {
        self.protocol() == ipv4_protocol::TCP
    }

    #[inline]
    pub fn is_sctp(&self) -> bool {
        self.protocol() == ipv4_protocol::SCTP
    }

    /// The whole packet this decoder is attached to
    pub fn packet(&self) -> BufferView<'a> {
        self.view
    }

    /// True when this is an IPv4 fragment
    pub fn is_fragment(&self) -> bool {
        self.fragment_offset() > 0 || self.more_fragments()
    }

    /// True when this is the last fragment of a fragmented datagram
    pub fn is_last_fragment(&self) -> bool {
        self.fragment_offset() > 0 && !self.more_fragments()
    }

    /// Reassembly key for this fragment
    pub fn fragment_key(&self) -> Ipv4FragmentKey {
        Ipv4FragmentKey::new(
            self.protocol(),
            self.src_address(),
            self.dst_address(),
            self.identification(),
        )
    }

    /// `[fragment_offset, fragment_offset + data_length)` as a pair
    pub fn fragment_range(&self) -> (usize, usize) {
        let first = self.fragment_offset();
        (first, first + self.data_length())
    }
}
