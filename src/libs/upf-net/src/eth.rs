//! Ethernet frame decoding

use crate::buffer::BufferView;
use crate::error::{NetError, NetResult};
use crate::types::{ether_type, MacAddr};

/// Minimum Ethernet frame header: two MAC addresses plus one
/// EtherType/tag word.
pub const ETH_MIN_FRAME_LEN: usize = 14;

const DST_MAC_OFFSET: usize = 0;
const SRC_MAC_OFFSET: usize = 6;
const DYNAMIC_HEADERS_OFFSET: usize = 12;

/// Decoder for an Ethernet frame stored in a `BufferView`.
///
/// Any number of 802.1Q / 802.1ad tags after the source MAC address is
/// walked on construction; `ether_type()` reports the value found after
/// the last tag.
#[derive(Debug, Clone)]
pub struct EthFrameDecoder<'a> {
    view: BufferView<'a>,
    actual_ether_type: u16,
    data_offset: usize,
}

impl<'a> EthFrameDecoder<'a> {
    pub fn new(eth_data: BufferView<'a>) -> NetResult<Self> {
        const CONTEXT: &str = "EthFrameDecoder::new";

        if eth_data.size() < ETH_MIN_FRAME_LEN {
            return Err(NetError::TooShort {
                needed: ETH_MIN_FRAME_LEN,
                available: eth_data.size(),
                context: CONTEXT,
            });
        }

        // Walk VLAN/QinQ tags until a plain EtherType shows up.
        let mut offset = DYNAMIC_HEADERS_OFFSET;
        let max_offset = eth_data.size() - 2;

        while offset <= max_offset {
            let raw = eth_data.u16_at_nocheck(offset);
            if raw == ether_type::VLAN || raw == ether_type::QINQ {
                offset += 4;
            } else {
                return Ok(EthFrameDecoder {
                    view: eth_data,
                    actual_ether_type: raw,
                    data_offset: offset + 2,
                });
            }
        }

        Err(NetError::malformed(
            CONTEXT,
            "tag walk ran past the end of the frame without an EtherType",
        ))
    }

    /// Destination MAC address
    pub fn dst_mac(&self) -> MacAddr {
        self.view.mac_at_nocheck(DST_MAC_OFFSET)
    }

    /// Source MAC address
    pub fn src_mac(&self) -> MacAddr {
        self.view.mac_at_nocheck(SRC_MAC_OFFSET)
    }

    /// The actual EtherType, after any 802.1Q/802.1ad tags
    #[inline]
    pub fn ether_type(&self) -> u16 {
        self.actual_ether_type
    }

    /// True when the frame carries IPv4
    #[inline]
    pub fn is_ipv4(&self) -> bool {
        self.actual_ether_type == ether_type::IPV4
    }

    /// Offset of the payload within the frame
    #[inline]
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Payload length, in bytes
    #[inline]
    pub fn data_length(&self) -> usize {
        self.view.size() - self.data_offset
    }

    /// Payload view
    pub fn data(&self) -> BufferView<'a> {
        // The tag walk proved the range on construction.
        self.view
            .sub_len(self.data_offset, self.data_length())
            .unwrap_or_default()
    }

    /// The whole frame this decoder is attached to
    pub fn frame(&self) -> BufferView<'a> {
        self.view
    }
}
