//! SCTP packet decoding
//!
//! The packet decoder walks the chunk sequence once on construction;
//! generic and DATA chunk decoders give access to individual chunks.

use crate::buffer::BufferView;
use crate::error::{NetError, NetResult};

/// SCTP common header length
pub const SCTP_COMMON_HEADER_LEN: usize = 12;

/// SCTP chunk header length (type, flags, length)
pub const SCTP_CHUNK_HEADER_LEN: usize = 4;

/// SCTP DATA chunk header length (chunk header + TSN, stream id,
/// stream sequence, PPID)
pub const SCTP_DATA_CHUNK_HEADER_LEN: usize = 16;

/// The payload protocol identifier assigned to S1-AP
/// (see <https://www.iana.org/assignments/sctp-parameters/sctp-parameters.xhtml#sctp-parameters-25>
/// and 3GPP TS 36.412 sect. 7)
pub const PPID_S1AP: u32 = 18;

/// SCTP chunk types
/// (see <https://www.iana.org/assignments/sctp-parameters/sctp-parameters.xhtml#sctp-parameters-1>)
pub mod chunk_type {
    pub const DATA: u8 = 0;
    pub const INIT: u8 = 1;
    pub const INIT_ACK: u8 = 2;
    pub const SACK: u8 = 3;
    pub const HEARTBEAT: u8 = 4;
    pub const HEARTBEAT_ACK: u8 = 5;
    pub const ABORT: u8 = 6;
    pub const SHUTDOWN: u8 = 7;
    pub const SHUTDOWN_ACK: u8 = 8;
    pub const ERROR: u8 = 9;
    pub const COOKIE_ECHO: u8 = 10;
    pub const COOKIE_ACK: u8 = 11;
    pub const ECNE: u8 = 12;
    pub const CWR: u8 = 13;
    pub const SHUTDOWN_COMPLETE: u8 = 14;
    pub const AUTH: u8 = 15;
    pub const I_DATA: u8 = 64;
    pub const ASCONF_ACK: u8 = 128;
    pub const RE_CONFIG: u8 = 130;
    pub const PAD: u8 = 132;
    pub const FORWARD_TSN: u8 = 192;
    pub const ASCONF: u8 = 193;
    pub const I_FORWARD_TSN: u8 = 194;
}

const TYPE_OFFSET: usize = 0;
const FLAGS_OFFSET: usize = 1;
const LENGTH_OFFSET: usize = 2;

/// Decoder for one generic SCTP chunk (header plus value).
#[derive(Debug, Clone)]
pub struct SctpGenericChunkDecoder<'a> {
    view: BufferView<'a>,
}

impl<'a> SctpGenericChunkDecoder<'a> {
    pub fn new(chunk: BufferView<'a>) -> NetResult<Self> {
        if chunk.size() < SCTP_CHUNK_HEADER_LEN {
            return Err(NetError::TooShort {
                needed: SCTP_CHUNK_HEADER_LEN,
                available: chunk.size(),
                context: "SctpGenericChunkDecoder::new",
            });
        }
        Ok(SctpGenericChunkDecoder { view: chunk })
    }

    #[inline]
    pub fn chunk_type(&self) -> u8 {
        self.view.u8_at_nocheck(TYPE_OFFSET)
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.view.u8_at_nocheck(FLAGS_OFFSET)
    }

    /// Unpadded chunk length, including the 4-byte chunk header
    #[inline]
    pub fn total_length(&self) -> usize {
        usize::from(self.view.u16_at_nocheck(LENGTH_OFFSET))
    }

    #[inline]
    pub fn is_data_chunk(&self) -> bool {
        self.chunk_type() == chunk_type::DATA
    }

    /// The whole chunk, headers included: a generic decoder does not
    /// interpret the value, so the payload is the chunk itself.
    pub fn data(&self) -> BufferView<'a> {
        self.view
    }
}

/// Decoder for an SCTP `DATA` chunk.
#[derive(Debug, Clone)]
pub struct SctpDataChunkDecoder<'a> {
    view: BufferView<'a>,
}

impl<'a> SctpDataChunkDecoder<'a> {
    pub fn new(chunk: BufferView<'a>) -> NetResult<Self> {
        if chunk.size() < SCTP_DATA_CHUNK_HEADER_LEN {
            return Err(NetError::TooShort {
                needed: SCTP_DATA_CHUNK_HEADER_LEN,
                available: chunk.size(),
                context: "SctpDataChunkDecoder::new",
            });
        }
        Ok(SctpDataChunkDecoder { view: chunk })
    }

    #[inline]
    pub fn chunk_type(&self) -> u8 {
        self.view.u8_at_nocheck(TYPE_OFFSET)
    }

    /// Unpadded chunk length, including the 16-byte DATA chunk header
    #[inline]
    pub fn total_length(&self) -> usize {
        usize::from(self.view.u16_at_nocheck(LENGTH_OFFSET))
    }

    #[inline]
    pub fn flag_i(&self) -> bool {
        (self.view.u8_at_nocheck(FLAGS_OFFSET) >> 3) & 1 != 0
    }

    #[inline]
    pub fn flag_u(&self) -> bool {
        (self.view.u8_at_nocheck(FLAGS_OFFSET) >> 2) & 1 != 0
    }

    /// Beginning-of-message flag
    #[inline]
    pub fn flag_b(&self) -> bool {
        (self.view.u8_at_nocheck(FLAGS_OFFSET) >> 1) & 1 != 0
    }

    /// End-of-message flag
    #[inline]
    pub fn flag_e(&self) -> bool {
        self.view.u8_at_nocheck(FLAGS_OFFSET) & 1 != 0
    }

    #[inline]
    pub fn tsn(&self) -> u32 {
        self.view.u32_at_nocheck(4)
    }

    #[inline]
    pub fn stream_identifier(&self) -> u16 {
        self.view.u16_at_nocheck(8)
    }

    #[inline]
    pub fn stream_sequence_number(&self) -> u16 {
        self.view.u16_at_nocheck(10)
    }

    #[inline]
    pub fn payload_protocol_identifier(&self) -> u32 {
        self.view.u32_at_nocheck(12)
    }

    /// Payload length, in bytes
    #[inline]
    pub fn data_length(&self) -> usize {
        self.total_length()
            .saturating_sub(SCTP_DATA_CHUNK_HEADER_LEN)
    }

    /// Payload view (range derives from the chunk length field)
    pub fn data(&self) -> NetResult<BufferView<'a>> {
        self.view
            .sub_len(SCTP_DATA_CHUNK_HEADER_LEN, self.data_length())
    }

    /// A DATA chunk carries a complete message iff both B and E are
    /// set; anything else is a fragment.
    pub fn is_fragment(&self) -> bool {
        !(self.flag_b() && self.flag_e())
    }

    /// True when the chunk carries S1-AP (PPID 18)
    pub fn is_s1ap(&self) -> bool {
        self.payload_protocol_identifier() == PPID_S1AP
    }
}

/// Decoder for a whole SCTP packet: common header plus chunk sequence.
#[derive(Debug, Clone)]
pub struct SctpDecoder<'a> {
    view: BufferView<'a>,
    chunks: Vec<SctpGenericChunkDecoder<'a>>,
}

impl<'a> SctpDecoder<'a> {
    pub fn new(sctp_data: BufferView<'a>) -> NetResult<Self> {
        const CONTEXT: &str = "SctpDecoder::new";

        if sctp_data.size() < SCTP_COMMON_HEADER_LEN {
            return Err(NetError::TooShort {
                needed: SCTP_COMMON_HEADER_LEN,
                available: sctp_data.size(),
                context: CONTEXT,
            });
        }

        // Walk the chunk sequence. Each chunk advances by its padded
        // length (a multiple of 4); the emitted view has the unpadded
        // length.
        let mut chunks = Vec::new();
        let mut offset = SCTP_COMMON_HEADER_LEN;
        let size = sctp_data.size();

        while offset < size {
            if offset + SCTP_CHUNK_HEADER_LEN > size {
                return Err(NetError::malformed(
                    CONTEXT,
                    format!("truncated chunk header at offset {offset}"),
                ));
            }

            let chunk_length = usize::from(sctp_data.u16_at_nocheck(offset + LENGTH_OFFSET));
            if chunk_length < SCTP_CHUNK_HEADER_LEN {
                return Err(NetError::malformed(
                    CONTEXT,
                    format!("chunk length {chunk_length} below chunk header size"),
                ));
            }

            let padded_length = (chunk_length + 3) & !3;
            sctp_data.check_bounds(CONTEXT, offset, padded_length).map_err(|_| {
                NetError::malformed(
                    CONTEXT,
                    format!(
                        "chunk at offset {offset} (padded length {padded_length}) walks past the buffer end"
                    ),
                )
            })?;

            chunks.push(SctpGenericChunkDecoder::new(
                sctp_data.sub_len(offset, chunk_length)?,
            )?);
            offset += padded_length;
        }

        Ok(SctpDecoder {
            view: sctp_data,
            chunks,
        })
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        self.view.u16_at_nocheck(0)
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.view.u16_at_nocheck(2)
    }

    #[inline]
    pub fn verification_tag(&self) -> u32 {
        self.view.u32_at_nocheck(4)
    }

    #[inline]
    pub fn checksum(&self) -> u32 {
        self.view.u32_at_nocheck(8)
    }

    /// The chunks of this packet, in wire order
    pub fn chunks(&self) -> &[SctpGenericChunkDecoder<'a>] {
        &self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_data_chunk(ppid: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
        let length = (SCTP_DATA_CHUNK_HEADER_LEN + payload.len()) as u16;
        let mut chunk = Vec::new();
        chunk.push(chunk_type::DATA);
        chunk.push(flags);
        chunk.extend_from_slice(&length.to_be_bytes());
        chunk.extend_from_slice(&1u32.to_be_bytes()); // TSN
        chunk.extend_from_slice(&5u16.to_be_bytes()); // stream id
        chunk.extend_from_slice(&0u16.to_be_bytes()); // stream seq
        chunk.extend_from_slice(&ppid.to_be_bytes());
        chunk.extend_from_slice(payload);
        chunk
    }

    fn build_sctp_packet(src: u16, dst: u16, chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&src.to_be_bytes());
        packet.extend_from_slice(&dst.to_be_bytes());
        packet.extend_from_slice(&0xDEADBEEFu32.to_be_bytes()); // verification tag
        packet.extend_from_slice(&0u32.to_be_bytes()); // checksum
        for chunk in chunks {
            packet.extend_from_slice(chunk);
            while packet.len() % 4 != 0 {
                packet.push(0);
            }
        }
        packet
    }

    #[test]
    fn test_common_header() {
        let packet = build_sctp_packet(36412, 36412, &[]);
        let dec = SctpDecoder::new(BufferView::new(&packet)).unwrap();
        assert_eq!(dec.src_port(), 36412);
        assert_eq!(dec.dst_port(), 36412);
        assert_eq!(dec.verification_tag(), 0xDEADBEEF);
        assert!(dec.chunks().is_empty());
    }

    #[test]
    fn test_chunk_iteration_with_padding() {
        // 5-byte payload: chunk length 21, padded to 24
        let data = build_data_chunk(PPID_S1AP, 0x03, b"hello");
        let sack = vec![chunk_type::SACK, 0, 0, 16, 0, 0, 0, 9, 0, 0, 0, 0, 0, 0, 0, 0];
        let packet = build_sctp_packet(1, 2, &[data, sack]);

        let dec = SctpDecoder::new(BufferView::new(&packet)).unwrap();
        assert_eq!(dec.chunks().len(), 2);

        let first = &dec.chunks()[0];
        assert!(first.is_data_chunk());
        assert_eq!(first.total_length(), 21);

        let second = &dec.chunks()[1];
        assert_eq!(second.chunk_type(), chunk_type::SACK);
        assert_eq!(second.total_length(), 16);
    }

    #[test]
    fn test_chunk_walking_past_end_is_malformed() {
        let mut chunk = build_data_chunk(PPID_S1AP, 0x03, b"hello");
        let declared = chunk.len() as u16 + 40;
        chunk[2..4].copy_from_slice(&declared.to_be_bytes());
        let packet = build_sctp_packet(1, 2, &[chunk]);

        let err = SctpDecoder::new(BufferView::new(&packet)).unwrap_err();
        assert!(matches!(err, NetError::Malformed { .. }));
    }

    #[test]
    fn test_data_chunk_fields() {
        let chunk_bytes = build_data_chunk(PPID_S1AP, 0x03, b"abc");
        let dec = SctpDataChunkDecoder::new(BufferView::new(&chunk_bytes)).unwrap();

        assert!(dec.flag_b());
        assert!(dec.flag_e());
        assert!(!dec.flag_u());
        assert!(!dec.flag_i());
        assert!(!dec.is_fragment());
        assert!(dec.is_s1ap());
        assert_eq!(dec.tsn(), 1);
        assert_eq!(dec.stream_identifier(), 5);
        assert_eq!(dec.data().unwrap().as_slice(), b"abc");
    }

    #[test]
    fn test_data_chunk_fragments() {
        // B only: first fragment
        let first = build_data_chunk(PPID_S1AP, 0x02, b"x");
        assert!(SctpDataChunkDecoder::new(BufferView::new(&first))
            .unwrap()
            .is_fragment());

        // E only: last fragment
        let last = build_data_chunk(PPID_S1AP, 0x01, b"x");
        assert!(SctpDataChunkDecoder::new(BufferView::new(&last))
            .unwrap()
            .is_fragment());

        // Neither: middle fragment
        let middle = build_data_chunk(PPID_S1AP, 0x00, b"x");
        assert!(SctpDataChunkDecoder::new(BufferView::new(&middle))
            .unwrap()
            .is_fragment());
    }

    #[test]
    fn test_non_s1ap_ppid() {
        let chunk = build_data_chunk(46, 0x03, b"diameter"); // PPID 46 = DIAMETER
        let dec = SctpDataChunkDecoder::new(BufferView::new(&chunk)).unwrap();
        assert!(!dec.is_s1ap());
    }

    #[test]
    fn test_short_buffers() {
        assert!(SctpDecoder::new(BufferView::new(&[0u8; 11])).is_err());
        assert!(SctpGenericChunkDecoder::new(BufferView::new(&[0u8; 3])).is_err());
        assert!(SctpDataChunkDecoder::new(BufferView::new(&[0u8; 15])).is_err());
    }
}
