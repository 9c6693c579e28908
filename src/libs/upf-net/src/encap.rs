//! GTPv1-U encapsulation builders
//!
//! In-place builders composing Ethernet/IPv4/UDP/GTPv1-U (or
//! IPv4/UDP/GTPv1-U) frames inside a caller-provided writable view.
//! Two payload modes are supported: copy the payload in, or declare the
//! payload already sitting at the reserved offset.

use std::net::Ipv4Addr;

use crate::buffer::{BufferView, BufferWritableView};
use crate::error::{NetError, NetResult};
use crate::interfaces::{ContextUserData, EthPacketSink, Ipv4PacketSink};
use crate::types::{MacAddr, Teid};

const ETH_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const GTP_HEADER_LEN: usize = 8;

/// Total header length of the IPv4-headed encapsulation
pub const GTP_IPV4_ENCAP_HEADER_LEN: usize = IPV4_HEADER_LEN + UDP_HEADER_LEN + GTP_HEADER_LEN;

/// Total header length of the Ethernet-headed encapsulation
pub const GTP_ETH_ENCAP_HEADER_LEN: usize = ETH_HEADER_LEN + GTP_IPV4_ENCAP_HEADER_LEN;

/// Largest payload an encapsulated IPv4 packet can carry
pub const MAX_GTP_PAYLOAD_LEN: usize = 65535 - GTP_IPV4_ENCAP_HEADER_LEN;

// Offsets within the L3 part, relative to the IPv4 header start.
const IPV4_TOTAL_LENGTH: usize = 2;
const IPV4_IDENTIFICATION: usize = 4;
const IPV4_CHECKSUM: usize = 10;
const IPV4_SRC_ADDRESS: usize = 12;
const IPV4_DST_ADDRESS: usize = 16;
const UDP_START: usize = IPV4_HEADER_LEN;
const UDP_SRC_PORT: usize = UDP_START;
const UDP_DST_PORT: usize = UDP_START + 2;
const UDP_TOTAL_LENGTH: usize = UDP_START + 4;
const UDP_CHECKSUM: usize = UDP_START + 6;
const GTP_START: usize = UDP_START + UDP_HEADER_LEN;
const GTP_MESSAGE_LENGTH: usize = GTP_START + 2;
const GTP_TEID: usize = GTP_START + 4;

/// Template for the IPv4 + UDP + GTPv1-U headers, copied in whole by
/// `init()`: IPv4 version 4 / IHL 5 / TTL 64 / protocol UDP, both UDP
/// ports 2152, GTP flags 0x38 (version 1, PT 1, reserved 1, no extra
/// fields), message type 0xFF (T-PDU), all lengths, addresses and
/// checksums zeroed.
const L3_HEADER_TEMPLATE: [u8; GTP_IPV4_ENCAP_HEADER_LEN] = [
    // IPv4 header
    0x45, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00,
    // UDP header (2152 → 2152)
    0x08, 0x68, 0x08, 0x68, 0x00, 0x00, 0x00, 0x00,
    // GTPv1-U header
    0x38, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Write the L3 template at `l3` inside `buffer`.
fn write_l3_template(buffer: &mut BufferWritableView<'_>, l3: usize) {
    buffer.as_mut_slice()[l3..l3 + GTP_IPV4_ENCAP_HEADER_LEN].copy_from_slice(&L3_HEADER_TEMPLATE);
}

/// Update the GTP message-length, UDP length and IPv4 total-length
/// fields for `payload_len` payload bytes.
fn update_length_fields(buffer: &mut BufferWritableView<'_>, l3: usize, payload_len: usize) {
    let gtp_message_length = payload_len as u16;
    let udp_total_length = gtp_message_length + (GTP_HEADER_LEN + UDP_HEADER_LEN) as u16;

    buffer.set_u16_at_nocheck(l3 + GTP_MESSAGE_LENGTH, gtp_message_length);
    buffer.set_u16_at_nocheck(l3 + UDP_TOTAL_LENGTH, udp_total_length);
    buffer.set_u16_at_nocheck(l3 + IPV4_TOTAL_LENGTH, udp_total_length + IPV4_HEADER_LEN as u16);
}

/// Fold a 32-bit one's-complement accumulator into 16 bits and invert,
/// with the `0xFFFF`-stays-`0xFFFF` rule.
fn fold_and_invert(mut sum: u32) -> u16 {
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    let folded = sum as u16;
    if folded == 0xFFFF {
        folded
    } else {
        !folded
    }
}

/// Compute and store the UDP checksum (when enabled) and the IPv4
/// header checksum.
fn compute_and_set_checksums(
    buffer: &mut BufferWritableView<'_>,
    l3: usize,
    payload_len: usize,
    enable_udp_checksum: bool,
) {
    let view = buffer.as_view();

    let udp_total_len = u32::from(view.u16_at_nocheck(l3 + UDP_TOTAL_LENGTH));

    let udp_header_sum = u32::from(view.u16_at_nocheck(l3 + UDP_SRC_PORT))
        + u32::from(view.u16_at_nocheck(l3 + UDP_DST_PORT))
        + udp_total_len;

    // Pseudo-header sum without the length term; reused below for the
    // IPv4 header checksum (src + dst + protocol 0x11).
    let pseudo_header_sum_nolength = u32::from(view.u16_at_nocheck(l3 + IPV4_SRC_ADDRESS))
        + u32::from(view.u16_at_nocheck(l3 + IPV4_SRC_ADDRESS + 2))
        + u32::from(view.u16_at_nocheck(l3 + IPV4_DST_ADDRESS))
        + u32::from(view.u16_at_nocheck(l3 + IPV4_DST_ADDRESS + 2))
        + 0x11;

    if enable_udp_checksum {
        // The UDP payload is the GTP header plus the encapsulated
        // packet.
        let udp_payload_sum = view
            .sub_len(l3 + GTP_START, GTP_HEADER_LEN + payload_len)
            .map(|v| v.sum16())
            .unwrap_or(0);

        let checksum = fold_and_invert(
            pseudo_header_sum_nolength + udp_total_len + udp_header_sum + udp_payload_sum,
        );
        buffer.set_u16_at_nocheck(l3 + UDP_CHECKSUM, checksum);
    }
    // With the UDP checksum disabled the field keeps the template's
    // 0x0000, which on IPv4 means "no checksum".

    // IPv4 header checksum: the first nine header bytes word-summed
    // (checksum slot treated as zero), plus the reused partial sum.
    let view = buffer.as_view();
    let ipv4_header_sum = u32::from(view.u16_at_nocheck(l3))
        + u32::from(view.u16_at_nocheck(l3 + 2))
        + u32::from(view.u16_at_nocheck(l3 + 4))
        + u32::from(view.u16_at_nocheck(l3 + 6))
        + (u32::from(view.u8_at_nocheck(l3 + 8)) << 8)
        + pseudo_header_sum_nolength;

    let checksum = fold_and_invert(ipv4_header_sum);
    buffer.set_u16_at_nocheck(l3 + IPV4_CHECKSUM, checksum);
}

/// Check the copy-mode payload fits, both the protocol ceiling and the
/// buffer room.
fn check_payload_fits(
    context: &'static str,
    payload_len: usize,
    room: usize,
) -> NetResult<()> {
    if payload_len > MAX_GTP_PAYLOAD_LEN {
        return Err(NetError::CapacityExceeded {
            needed: payload_len,
            available: MAX_GTP_PAYLOAD_LEN,
            context,
        });
    }
    if payload_len > room {
        return Err(NetError::CapacityExceeded {
            needed: payload_len,
            available: room,
            context,
        });
    }
    Ok(())
}

/// Encapsulates an IPv4 payload into an IPv4/UDP/GTPv1-U packet.
///
/// Call order: `init()`, the field setters, one of the `set_payload`
/// forms, then `compute_and_set_checksums()`; the finished packet is
/// returned by `ipv4_packet()`.
#[derive(Debug)]
pub struct GtpIpv4Encap<'a> {
    buffer: BufferWritableView<'a>,
    payload_len: usize,
    frame_len: usize,
    enable_udp_checksum: bool,
}

impl<'a> GtpIpv4Encap<'a> {
    /// The offset at which the payload must already sit when using
    /// [`set_payload_in_place`](Self::set_payload_in_place).
    pub const PAYLOAD_START_OFFSET: usize = GTP_IPV4_ENCAP_HEADER_LEN;

    pub fn new(buffer: BufferWritableView<'a>) -> NetResult<Self> {
        if buffer.size() < GTP_IPV4_ENCAP_HEADER_LEN {
            return Err(NetError::TooShort {
                needed: GTP_IPV4_ENCAP_HEADER_LEN,
                available: buffer.size(),
                context: "GtpIpv4Encap::new",
            });
        }
        Ok(GtpIpv4Encap {
            buffer,
            payload_len: 0,
            frame_len: 0,
            enable_udp_checksum: true,
        })
    }

    /// Enable/disable the UDP checksum (default: enabled).
    ///
    /// The UDP checksum is optional on IPv4 and redundant for GTPv1-U
    /// payloads that carry their own checksums; disabling it leaves the
    /// field zero.
    pub fn enable_udp_checksum(&mut self, enable: bool) -> &mut Self {
        self.enable_udp_checksum = enable;
        self
    }

    /// Stamp the fixed header template for a new packet.
    pub fn init(&mut self) -> &mut Self {
        write_l3_template(&mut self.buffer, 0);
        self
    }

    pub fn set_src_address(&mut self, src: Ipv4Addr) -> &mut Self {
        self.buffer.set_ipv4_at_nocheck(IPV4_SRC_ADDRESS, src);
        self
    }

    pub fn set_dst_address(&mut self, dst: Ipv4Addr) -> &mut Self {
        self.buffer.set_ipv4_at_nocheck(IPV4_DST_ADDRESS, dst);
        self
    }

    /// Set the IPv4 `Identification` field; feed it from an
    /// [`Ipv4IdentificationSource`](crate::ipv4::Ipv4IdentificationSource).
    pub fn set_identification(&mut self, identification: u16) -> &mut Self {
        self.buffer
            .set_u16_at_nocheck(IPV4_IDENTIFICATION, identification);
        self
    }

    /// Change the UDP source port (default 2152).
    pub fn set_src_port(&mut self, port: u16) -> &mut Self {
        self.buffer.set_u16_at_nocheck(UDP_SRC_PORT, port);
        self
    }

    /// Change the UDP destination port (default 2152).
    pub fn set_dst_port(&mut self, port: u16) -> &mut Self {
        self.buffer.set_u16_at_nocheck(UDP_DST_PORT, port);
        self
    }

    /// Set the TEID of the target tunnel.
    pub fn set_teid(&mut self, teid: Teid) -> &mut Self {
        self.buffer.set_u32_at_nocheck(GTP_TEID, teid);
        self
    }

    /// Copy `ipv4_data` into the payload area and update the length
    /// fields.
    ///
    /// `ipv4_data.size()` is trusted to match the length declared in
    /// its own IPv4 header; this is not verified.
    pub fn set_payload(&mut self, ipv4_data: BufferView<'_>) -> NetResult<&mut Self> {
        check_payload_fits(
            "GtpIpv4Encap::set_payload",
            ipv4_data.size(),
            self.buffer.size() - GTP_IPV4_ENCAP_HEADER_LEN,
        )?;

        self.buffer
            .copy_from(GTP_IPV4_ENCAP_HEADER_LEN, ipv4_data)?;
        self.payload_len = ipv4_data.size();
        update_length_fields(&mut self.buffer, 0, self.payload_len);
        self.frame_len = GTP_IPV4_ENCAP_HEADER_LEN + self.payload_len;
        Ok(self)
    }

    /// Declare that the payload already sits at
    /// [`PAYLOAD_START_OFFSET`](Self::PAYLOAD_START_OFFSET) and fills
    /// the rest of the buffer; nothing is copied.
    pub fn set_payload_in_place(&mut self) -> NetResult<&mut Self> {
        const CONTEXT: &str = "GtpIpv4Encap::set_payload_in_place";

        let payload_len = self.buffer.size() - GTP_IPV4_ENCAP_HEADER_LEN;
        if payload_len > MAX_GTP_PAYLOAD_LEN {
            return Err(NetError::CapacityExceeded {
                needed: payload_len,
                available: MAX_GTP_PAYLOAD_LEN,
                context: CONTEXT,
            });
        }

        if payload_len > 0
            && (self.buffer.as_view().u8_at_nocheck(GTP_IPV4_ENCAP_HEADER_LEN) >> 4) != 4
        {
            return Err(NetError::malformed(CONTEXT, "payload is not IPv4"));
        }

        self.payload_len = payload_len;
        update_length_fields(&mut self.buffer, 0, self.payload_len);
        self.frame_len = self.buffer.size();
        Ok(self)
    }

    /// Compute and store the checksums. Set the addresses, the
    /// identification, any non-default ports and the payload first.
    pub fn compute_and_set_checksums(&mut self) -> &mut Self {
        compute_and_set_checksums(&mut self.buffer, 0, self.payload_len, self.enable_udp_checksum);
        self
    }

    /// The finished IPv4 packet: headers plus payload.
    pub fn ipv4_packet(&self) -> BufferView<'_> {
        self.buffer
            .as_view()
            .sub_len(0, self.frame_len)
            .unwrap_or_default()
    }
}

/// Encapsulates an IPv4 payload into an Ethernet frame carrying
/// IPv4/UDP/GTPv1-U.
///
/// Identical to [`GtpIpv4Encap`] with a leading Ethernet header
/// (EtherType 0x0800) and MAC setters.
pub struct GtpEthEncap<'a> {
    buffer: BufferWritableView<'a>,
    payload_len: usize,
    frame_len: usize,
    enable_udp_checksum: bool,
}

impl<'a> GtpEthEncap<'a> {
    /// The offset at which the payload must already sit when using
    /// [`set_payload_in_place`](Self::set_payload_in_place).
    pub const PAYLOAD_START_OFFSET: usize = GTP_ETH_ENCAP_HEADER_LEN;

    pub fn new(buffer: BufferWritableView<'a>) -> NetResult<Self> {
        if buffer.size() < GTP_ETH_ENCAP_HEADER_LEN {
            return Err(NetError::TooShort {
                needed: GTP_ETH_ENCAP_HEADER_LEN,
                available: buffer.size(),
                context: "GtpEthEncap::new",
            });
        }
        Ok(GtpEthEncap {
            buffer,
            payload_len: 0,
            frame_len: 0,
            enable_udp_checksum: true,
        })
    }

    /// Enable/disable the UDP checksum (default: enabled).
    pub fn enable_udp_checksum(&mut self, enable: bool) -> &mut Self {
        self.enable_udp_checksum = enable;
        self
    }

    /// Stamp the fixed header template for a new frame: zeroed MAC
    /// addresses, EtherType 0x0800, then the L3 template.
    pub fn init(&mut self) -> &mut Self {
        let eth = &mut self.buffer.as_mut_slice()[..ETH_HEADER_LEN];
        eth.fill(0);
        eth[12] = 0x08;
        eth[13] = 0x00;
        write_l3_template(&mut self.buffer, ETH_HEADER_LEN);
        self
    }

    pub fn set_dst_mac(&mut self, dst: MacAddr) -> &mut Self {
        self.buffer.set_mac_at_nocheck(0, dst);
        self
    }

    pub fn set_src_mac(&mut self, src: MacAddr) -> &mut Self {
        self.buffer.set_mac_at_nocheck(6, src);
        self
    }

    pub fn set_src_address(&mut self, src: Ipv4Addr) -> &mut Self {
        self.buffer
            .set_ipv4_at_nocheck(ETH_HEADER_LEN + IPV4_SRC_ADDRESS, src);
        self
    }

    pub fn set_dst_address(&mut self, dst: Ipv4Addr) -> &mut Self {
        self.buffer
            .set_ipv4_at_nocheck(ETH_HEADER_LEN + IPV4_DST_ADDRESS, dst);
        self
    }

    /// Set the IPv4 `Identification` field.
    pub fn set_identification(&mut self, identification: u16) -> &mut Self {
        self.buffer
            .set_u16_at_nocheck(ETH_HEADER_LEN + IPV4_IDENTIFICATION, identification);
        self
    }

    /// Change the UDP source port (default 2152).
    pub fn set_src_port(&mut self, port: u16) -> &mut Self {
        self.buffer
            .set_u16_at_nocheck(ETH_HEADER_LEN + UDP_SRC_PORT, port);
        self
    }

    /// Change the UDP destination port (default 2152).
    pub fn set_dst_port(&mut self, port: u16) -> &mut Self {
        self.buffer
            .set_u16_at_nocheck(ETH_HEADER_LEN + UDP_DST_PORT, port);
        self
    }

    /// Set the TEID of the target tunnel.
    pub fn set_teid(&mut self, teid: Teid) -> &mut Self {
        self.buffer
            .set_u32_at_nocheck(ETH_HEADER_LEN + GTP_TEID, teid);
        self
    }

    /// Copy `ipv4_data` into the payload area and update the length
    /// fields.
    pub fn set_payload(&mut self, ipv4_data: BufferView<'_>) -> NetResult<&mut Self> {
        check_payload_fits(
            "GtpEthEncap::set_payload",
            ipv4_data.size(),
            self.buffer.size() - GTP_ETH_ENCAP_HEADER_LEN,
        )?;

        self.buffer.copy_from(GTP_ETH_ENCAP_HEADER_LEN, ipv4_data)?;
        self.payload_len = ipv4_data.size();
        update_length_fields(&mut self.buffer, ETH_HEADER_LEN, self.payload_len);
        self.frame_len = GTP_ETH_ENCAP_HEADER_LEN + self.payload_len;
        Ok(self)
    }

    /// Declare that the payload already sits at
    /// [`PAYLOAD_START_OFFSET`](Self::PAYLOAD_START_OFFSET) and fills
    /// the rest of the buffer; nothing is copied.
    pub fn set_payload_in_place(&mut self) -> NetResult<&mut Self> {
        const CONTEXT: &str = "GtpEthEncap::set_payload_in_place";

        let payload_len = self.buffer.size() - GTP_ETH_ENCAP_HEADER_LEN;
        if payload_len > MAX_GTP_PAYLOAD_LEN {
            return Err(NetError::CapacityExceeded {
                needed: payload_len,
                available: MAX_GTP_PAYLOAD_LEN,
                context: CONTEXT,
            });
        }

        if payload_len > 0
            && (self.buffer.as_view().u8_at_nocheck(GTP_ETH_ENCAP_HEADER_LEN) >> 4) != 4
        {
            return Err(NetError::malformed(CONTEXT, "payload is not IPv4"));
        }

        self.payload_len = payload_len;
        update_length_fields(&mut self.buffer, ETH_HEADER_LEN, self.payload_len);
        self.frame_len = self.buffer.size();
        Ok(self)
    }

    /// Compute and store the checksums. Set the addresses, the
    /// identification, any non-default ports and the payload first.
    pub fn compute_and_set_checksums(&mut self) -> &mut Self {
        compute_and_set_checksums(
            &mut self.buffer,
            ETH_HEADER_LEN,
            self.payload_len,
            self.enable_udp_checksum,
        );
        self
    }

    /// The finished Ethernet frame: headers plus payload.
    pub fn eth_frame(&self) -> BufferView<'_> {
        self.buffer
            .as_view()
            .sub_len(0, self.frame_len)
            .unwrap_or_default()
    }
}

/// An `Ipv4PacketSink` that frames each IPv4 packet into a plain
/// Ethernet frame and forwards it to an `EthPacketSink`.
pub struct Ipv4EncapSink<D: EthPacketSink> {
    destination: D,
    frame_buffer: Vec<u8>,
    default_src: MacAddr,
    default_dst: MacAddr,
}

impl<D: EthPacketSink> Ipv4EncapSink<D> {
    pub fn new(destination: D, max_frame_len: usize) -> Self {
        Ipv4EncapSink {
            destination,
            frame_buffer: vec![0u8; max_frame_len],
            default_src: MacAddr::default(),
            default_dst: MacAddr::default(),
        }
    }

    /// The MAC used as the frame source (default 00:00:00:00:00:00)
    pub fn set_default_src_mac(&mut self, mac: MacAddr) {
        self.default_src = mac;
    }

    /// The MAC used as the frame destination (default 00:00:00:00:00:00)
    pub fn set_default_dst_mac(&mut self, mac: MacAddr) {
        self.default_dst = mac;
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn destination_mut(&mut self) -> &mut D {
        &mut self.destination
    }
}

impl<D: EthPacketSink> Ipv4PacketSink for Ipv4EncapSink<D> {
    fn consume_ipv4_packet(
        &mut self,
        ipv4_data: BufferView<'_>,
        user_data: &mut ContextUserData,
    ) -> NetResult<()> {
        let frame_len = ETH_HEADER_LEN + ipv4_data.size();
        if frame_len > self.frame_buffer.len() {
            return Err(NetError::CapacityExceeded {
                needed: frame_len,
                available: self.frame_buffer.len(),
                context: "Ipv4EncapSink::consume_ipv4_packet",
            });
        }

        let mut frame = BufferWritableView::new(&mut self.frame_buffer[..frame_len]);
        frame.set_mac_at_nocheck(0, self.default_dst);
        frame.set_mac_at_nocheck(6, self.default_src);
        frame.set_u16_at_nocheck(12, crate::types::ether_type::IPV4);
        frame.copy_from(ETH_HEADER_LEN, ipv4_data)?;

        self.destination
            .consume_eth_packet(frame.as_view(), user_data)
    }
}
