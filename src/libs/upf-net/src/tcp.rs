//! TCP segment decoding

use crate::buffer::BufferView;
use crate::error::{NetError, NetResult};

/// Minimum TCP header length (no options)
pub const TCP_MIN_HEADER_LEN: usize = 20;

const SRC_PORT_OFFSET: usize = 0;
const DST_PORT_OFFSET: usize = 2;
const SEQUENCE_OFFSET: usize = 4;
const ACK_OFFSET: usize = 8;
const DATA_OFFSET_AND_FLAGS_OFFSET: usize = 12;
const WINDOW_OFFSET: usize = 14;
const CHECKSUM_OFFSET: usize = 16;

/// Decoder for a TCP segment stored in a `BufferView`.
#[derive(Debug, Clone)]
pub struct TcpDecoder<'a> {
    view: BufferView<'a>,
}

impl<'a> TcpDecoder<'a> {
    pub fn new(tcp_data: BufferView<'a>) -> NetResult<Self> {
        if tcp_data.size() < TCP_MIN_HEADER_LEN {
            return Err(NetError::TooShort {
                needed: TCP_MIN_HEADER_LEN,
                available: tcp_data.size(),
                context: "TcpDecoder::new",
            });
        }
        Ok(TcpDecoder { view: tcp_data })
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        self.view.u16_at_nocheck(SRC_PORT_OFFSET)
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.view.u16_at_nocheck(DST_PORT_OFFSET)
    }

    #[inline]
    pub fn sequence_number(&self) -> u32 {
        self.view.u32_at_nocheck(SEQUENCE_OFFSET)
    }

    #[inline]
    pub fn ack_number(&self) -> u32 {
        self.view.u32_at_nocheck(ACK_OFFSET)
    }

    #[inline]
    pub fn window_size(&self) -> u16 {
        self.view.u16_at_nocheck(WINDOW_OFFSET)
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.view.u16_at_nocheck(CHECKSUM_OFFSET)
    }

    #[inline]
    fn data_offset_and_flags(&self) -> u16 {
        self.view.u16_at_nocheck(DATA_OFFSET_AND_FLAGS_OFFSET)
    }

    /// Header length in bytes, from the data-offset field
    #[inline]
    pub fn data_offset_bytes(&self) -> usize {
        usize::from((self.data_offset_and_flags() >> 12) & 0x0F) * 4
    }

    #[inline]
    fn flag(&self, bit: u16) -> bool {
        (self.data_offset_and_flags() >> bit) & 1 != 0
    }

    #[inline]
    pub fn flag_ns(&self) -> bool {
        self.flag(8)
    }

    #[inline]
    pub fn flag_cwr(&self) -> bool {
        self.flag(7)
    }

    #[inline]
    pub fn flag_ece(&self) -> bool {
        self.flag(6)
    }

    #[inline]
    pub fn flag_urg(&self) -> bool {
        self.flag(5)
    }

    #[inline]
    pub fn flag_ack(&self) -> bool {
        self.flag(4)
    }

    #[inline]
    pub fn flag_psh(&self) -> bool {
        self.flag(3)
    }

    #[inline]
    pub fn flag_rst(&self) -> bool {
        self.flag(2)
    }

    #[inline]
    pub fn flag_syn(&self) -> bool {
        self.flag(1)
    }

    #[inline]
    pub fn flag_fin(&self) -> bool {
        self.flag(0)
    }

    /// Payload length, in bytes
    #[inline]
    pub fn data_length(&self) -> usize {
        self.view.size().saturating_sub(self.data_offset_bytes())
    }

    /// Payload view (range derives from the data-offset field)
    pub fn data(&self) -> NetResult<BufferView<'a>> {
        self.view.sub(self.data_offset_bytes())
    }
}
