//! UDP datagram decoding

use crate::buffer::BufferView;
use crate::error::{NetError, NetResult};

/// UDP header length
pub const UDP_HEADER_LEN: usize = 8;

const SRC_PORT_OFFSET: usize = 0;
const DST_PORT_OFFSET: usize = 2;
const TOTAL_LENGTH_OFFSET: usize = 4;
const CHECKSUM_OFFSET: usize = 6;

/// Decoder for a UDP datagram stored in a `BufferView`.
#[derive(Debug, Clone)]
pub struct UdpDecoder<'a> {
    view: BufferView<'a>,
}

impl<'a> UdpDecoder<'a> {
    pub fn new(udp_data: BufferView<'a>) -> NetResult<Self> {
        if udp_data.size() < UDP_HEADER_LEN {
            return Err(NetError::TooShort {
                needed: UDP_HEADER_LEN,
                available: udp_data.size(),
                context: "UdpDecoder::new",
            });
        }
        Ok(UdpDecoder { view: udp_data })
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        self.view.u16_at_nocheck(SRC_PORT_OFFSET)
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.view.u16_at_nocheck(DST_PORT_OFFSET)
    }

    /// The 16-bit UDP length field (header + payload)
    #[inline]
    pub fn total_length(&self) -> usize {
        usize::from(self.view.u16_at_nocheck(TOTAL_LENGTH_OFFSET))
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.view.u16_at_nocheck(CHECKSUM_OFFSET)
    }

    /// Payload length, in bytes
    #[inline]
    pub fn data_length(&self) -> usize {
        self.total_length().saturating_sub(UDP_HEADER_LEN)
    }

    /// Payload view (range derives from the length field)
    pub fn data(&self) -> NetResult<BufferView<'a>> {
        self.view.sub_len(UDP_HEADER_LEN, self.data_length())
    }

    /// Heuristic: true if the payload looks like GTPv1-U.
    ///
    /// Checks, in order:
    /// * the payload is longer than the 8-byte GTPv1-U header;
    /// * the first payload byte carries version 1 / protocol type 1
    ///   (top nibble `0x3`);
    /// * the GTP message-length field equals the payload length minus
    ///   the GTP header.
    ///
    /// The destination port is deliberately not checked (it should be
    /// 2152 but may differ), and neither is the T-PDU message type
    /// (other message types are still GTPv1-U).
    pub fn is_gtpv1u(&self) -> bool {
        let udp_len = self.data_length();
        if udp_len <= 8 || self.view.size() < UDP_HEADER_LEN + 4 {
            return false;
        }
        (self.view.u8_at_nocheck(UDP_HEADER_LEN) & 0xF0) == 0x30
            && usize::from(self.view.u16_at_nocheck(UDP_HEADER_LEN + 2)) + 8 == udp_len
    }
}
