//! Human-readable decoder dumps
//!
//! One-line `Display` implementations for the decoders, for log lines
//! and diagnostic front-ends.

use std::fmt;

use crate::eth::EthFrameDecoder;
use crate::gtp_u::Gtpv1uDecoder;
use crate::ipv4::Ipv4Decoder;
use crate::sctp::{SctpDataChunkDecoder, SctpDecoder, SctpGenericChunkDecoder};
use crate::tcp::TcpDecoder;
use crate::types::{ether_type, ipv4_protocol};
use crate::udp::UdpDecoder;

fn ether_type_name(value: u16) -> &'static str {
    match value {
        ether_type::IPV4 => "IPv4",
        ether_type::ARP => "ARP",
        ether_type::RARP => "RARP",
        ether_type::IPV6 => "IPv6",
        _ => "unknown",
    }
}

fn protocol_name(value: u8) -> &'static str {
    match value {
        ipv4_protocol::ICMP => "ICMP",
        ipv4_protocol::IGMP => "IGMP",
        ipv4_protocol::TCP => "TCP",
        ipv4_protocol::UDP => "UDP",
        ipv4_protocol::SCTP => "SCTP",
        _ => "unknown",
    }
}

impl fmt::Display for EthFrameDecoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Eth {} -> {} type 0x{:04x} ({}) payload {}B",
            self.src_mac(),
            self.dst_mac(),
            self.ether_type(),
            ether_type_name(self.ether_type()),
            self.data_length()
        )
    }
}

impl fmt::Display for Ipv4Decoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv4 {} -> {} proto {} ({}) id 0x{:04x} ttl {} len {}",
            self.src_address(),
            self.dst_address(),
            self.protocol(),
            protocol_name(self.protocol()),
            self.identification(),
            self.ttl(),
            self.total_length()
        )?;
        if self.is_fragment() {
            write!(
                f,
                " frag@{}{}",
                self.fragment_offset(),
                if self.more_fragments() { "+" } else { "" }
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for UdpDecoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UDP {} -> {} len {}{}",
            self.src_port(),
            self.dst_port(),
            self.total_length(),
            if self.is_gtpv1u() { " [GTPv1-U]" } else { "" }
        )
    }
}

impl fmt::Display for TcpDecoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = String::new();
        for (set, name) in [
            (self.flag_syn(), "SYN"),
            (self.flag_ack(), "ACK"),
            (self.flag_psh(), "PSH"),
            (self.flag_rst(), "RST"),
            (self.flag_fin(), "FIN"),
            (self.flag_urg(), "URG"),
        ] {
            if set {
                if !flags.is_empty() {
                    flags.push(',');
                }
                flags.push_str(name);
            }
        }
        write!(
            f,
            "TCP {} -> {} seq {} [{}] payload {}B",
            self.src_port(),
            self.dst_port(),
            self.sequence_number(),
            flags,
            self.data_length()
        )
    }
}

impl fmt::Display for SctpDecoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SCTP {} -> {} vtag 0x{:08x} chunks {}",
            self.src_port(),
            self.dst_port(),
            self.verification_tag(),
            self.chunks().len()
        )
    }
}

impl fmt::Display for SctpGenericChunkDecoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SCTP chunk type {} flags 0x{:02x} len {}",
            self.chunk_type(),
            self.flags(),
            self.total_length()
        )
    }
}

impl fmt::Display for SctpDataChunkDecoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SCTP DATA tsn {} stream {}/{} ppid {}{}{}",
            self.tsn(),
            self.stream_identifier(),
            self.stream_sequence_number(),
            self.payload_protocol_identifier(),
            if self.is_fragment() { " fragment" } else { "" },
            if self.is_s1ap() { " [S1AP]" } else { "" }
        )
    }
}

impl fmt::Display for Gtpv1uDecoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GTPv1-U teid 0x{:08x} msg 0x{:02x} len {}{}",
            self.teid(),
            self.message_type(),
            self.message_length(),
            if self.is_ipv4_pdu() { " [IPv4 PDU]" } else { "" }
        )
    }
}
