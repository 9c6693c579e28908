//! GTPv1-U packet decoding
//!
//! GTPv1-U header layout as specified in 3GPP TS 29.060.

use std::net::Ipv4Addr;

use crate::buffer::BufferView;
use crate::error::{NetError, NetResult};
use crate::types::{port, Teid, TEID_UNSPECIFIED};

/// GTPv1-U common header length
pub const GTPV1U_HEADER_LEN: usize = 8;

/// GTPv1-U flag bits (byte 0)
pub const GTPV1U_FLAGS_E: u8 = 0x04;
pub const GTPV1U_FLAGS_S: u8 = 0x02;
pub const GTPV1U_FLAGS_PN: u8 = 0x01;

/// T-PDU message type
pub const GTPV1U_MSG_TPDU: u8 = 0xFF;

const MESSAGE_TYPE_OFFSET: usize = 1;
const MESSAGE_LENGTH_OFFSET: usize = 2;
const TEID_OFFSET: usize = 4;
const SEQUENCE_NUMBER_OFFSET: usize = 8;
const NPDU_NUMBER_OFFSET: usize = 10;
const NEXT_EXTENSION_TYPE_OFFSET: usize = 11;
const END_OF_COMMON_HEADER: usize = 8;

/// A GTPv1-U tunnel endpoint: `(IPv4 address, UDP port, TEID)`.
///
/// In practice the port is almost always the well-known 2152.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GtpEndpoint {
    pub address: Ipv4Addr,
    pub port: u16,
    pub teid: Teid,
}

impl GtpEndpoint {
    pub fn new(address: Ipv4Addr, port: u16, teid: Teid) -> Self {
        GtpEndpoint {
            address,
            port,
            teid,
        }
    }
}

impl Default for GtpEndpoint {
    fn default() -> Self {
        GtpEndpoint {
            address: Ipv4Addr::UNSPECIFIED,
            port: port::UNSPECIFIED,
            teid: TEID_UNSPECIFIED,
        }
    }
}

/// Decoder for a GTPv1-U packet stored in a `BufferView`.
///
/// Construction validates the version/protocol-type nibble and walks the
/// extension-header chain to locate the payload.
#[derive(Debug, Clone)]
pub struct Gtpv1uDecoder<'a> {
    view: BufferView<'a>,
    extension_headers: Vec<BufferView<'a>>,
    data_offset: usize,
}

impl<'a> Gtpv1uDecoder<'a> {
    pub fn new(gtpu_data: BufferView<'a>) -> NetResult<Self> {
        const CONTEXT: &str = "Gtpv1uDecoder::new";

        if gtpu_data.size() < GTPV1U_HEADER_LEN {
            return Err(NetError::TooShort {
                needed: GTPV1U_HEADER_LEN,
                available: gtpu_data.size(),
                context: CONTEXT,
            });
        }

        let version_and_pt = gtpu_data.u8_at_nocheck(0) >> 4;
        if version_and_pt != 0x03 {
            return Err(NetError::malformed(
                CONTEXT,
                format!("version+PT nibble is {version_and_pt:#x}, expected 0x3"),
            ));
        }

        let mut decoder = Gtpv1uDecoder {
            view: gtpu_data,
            extension_headers: Vec::new(),
            data_offset: END_OF_COMMON_HEADER,
        };

        if decoder.has_optional_fields() {
            let mut offset = NEXT_EXTENSION_TYPE_OFFSET;

            if decoder.has_next_extension_field() {
                // Zero or more extension headers follow. A next-type
                // value of 0 means "no more extension headers"
                // (3GPP TS 29.060 sect. 6); the length of each header
                // is `4 * n` octets.
                while decoder.view.u8_at(offset)? != 0 {
                    let ext_len = 4 * usize::from(decoder.view.u8_at(offset + 1)?);
                    if ext_len == 0 {
                        return Err(NetError::malformed(
                            CONTEXT,
                            format!("zero-length extension header at offset {offset}"),
                        ));
                    }
                    decoder
                        .extension_headers
                        .push(decoder.view.sub_len(offset, ext_len)?);
                    offset += ext_len;
                }
            }

            decoder.data_offset = offset;
        }

        Ok(decoder)
    }

    #[inline]
    pub fn version(&self) -> u8 {
        (self.view.u8_at_nocheck(0) >> 5) & 0x07
    }

    #[inline]
    pub fn protocol_type(&self) -> u8 {
        u8::from(self.view.u8_at_nocheck(0) & 0x10 != 0)
    }

    #[inline]
    pub fn has_next_extension_field(&self) -> bool {
        self.view.u8_at_nocheck(0) & GTPV1U_FLAGS_E != 0
    }

    #[inline]
    pub fn has_sequence_number_field(&self) -> bool {
        self.view.u8_at_nocheck(0) & GTPV1U_FLAGS_S != 0
    }

    #[inline]
    pub fn has_npdu_field(&self) -> bool {
        self.view.u8_at_nocheck(0) & GTPV1U_FLAGS_PN != 0
    }

    /// True when any of the E/S/PN flags is set, meaning the 4-byte
    /// optional block follows the common header.
    ///
    /// Each optional field is only significant when its own flag is
    /// set, regardless of the block being present.
    #[inline]
    pub fn has_optional_fields(&self) -> bool {
        self.view.u8_at_nocheck(0) & 0x07 != 0
    }

    #[inline]
    pub fn message_type(&self) -> u8 {
        self.view.u8_at_nocheck(MESSAGE_TYPE_OFFSET)
    }

    /// The 16-bit message-length field: everything after the common
    /// header, optional block and extension headers included.
    #[inline]
    pub fn message_length(&self) -> usize {
        usize::from(self.view.u16_at_nocheck(MESSAGE_LENGTH_OFFSET))
    }

    #[inline]
    pub fn teid(&self) -> Teid {
        self.view.u32_at_nocheck(TEID_OFFSET)
    }

    /// Sequence number, or 0 when the S flag says it is not significant
    pub fn sequence_number(&self) -> u16 {
        if self.has_sequence_number_field() {
            self.view.u16_at(SEQUENCE_NUMBER_OFFSET).unwrap_or(0)
        } else {
            0
        }
    }

    /// N-PDU number, or 0 when the PN flag says it is not significant
    pub fn npdu_number(&self) -> u8 {
        if self.has_npdu_field() {
            self.view.u8_at(NPDU_NUMBER_OFFSET).unwrap_or(0)
        } else {
            0
        }
    }

    /// First next-extension-type value, or 0 when the E flag is clear
    pub fn first_next_extension_type(&self) -> u8 {
        if self.has_next_extension_field() {
            self.view.u8_at(NEXT_EXTENSION_TYPE_OFFSET).unwrap_or(0)
        } else {
            0
        }
    }

    /// The extension headers of this packet, if any.
    ///
    /// Each stored view deliberately begins one byte before the
    /// conventional header start: its first byte is the *preceding*
    /// header's next-extension-type value, so every entry reads as a
    /// self-describing `<next-type, length-in-words, body…>` record.
    /// Consequently the views are not 4-byte aligned and carry no
    /// trailing next-type byte of their own.
    pub fn extension_headers(&self) -> &[BufferView<'a>] {
        &self.extension_headers
    }

    /// Offset of the payload within the packet
    #[inline]
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// Payload length, in bytes
    #[inline]
    pub fn data_length(&self) -> usize {
        (self.message_length() + END_OF_COMMON_HEADER).saturating_sub(self.data_offset)
    }

    /// Payload view (range derives from the message-length field)
    pub fn data(&self) -> NetResult<BufferView<'a>> {
        self.view.sub_len(self.data_offset, self.data_length())
    }

    /// True when the payload is an IPv4 packet or fragment (T-PDU)
    #[inline]
    pub fn is_ipv4_pdu(&self) -> bool {
        self.message_type() == GTPV1U_MSG_TPDU
    }
}
