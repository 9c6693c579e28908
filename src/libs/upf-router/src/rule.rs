//! Traffic matching rules
//!
//! A small ordered list of `(protocol, destination CIDR, destination
//! port)` patterns, used to decide which IPv4 traffic a front-end
//! should hand to the encapsulation path.

use std::fmt;
use std::str::FromStr;

use upf_net::error::{NetError, NetResult};
use upf_net::ipv4::Ipv4Decoder;
use upf_net::sctp::SctpDecoder;
use upf_net::tcp::TcpDecoder;
use upf_net::types::{ipv4_protocol, port, Ipv4Cidr};
use upf_net::udp::UdpDecoder;

/// One matching rule.
///
/// Textual form: `<protocol>-<address>/<mask>-<port>`, with `*`
/// standing for "any" in the protocol and port fields. Example:
/// `6-192.168.1.0/24-80`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchingRule {
    /// The protocol number to match (0 = any)
    pub protocol: u8,

    /// CIDR matched against the destination address
    pub dst_cidr: Ipv4Cidr,

    /// Port matched against the destination port (0 = any).
    ///
    /// Only meaningful for protocols carrying ports (TCP/UDP/SCTP); a
    /// port rule never matches a packet of any other protocol.
    pub dst_port: u16,
}

impl Default for MatchingRule {
    /// A rule matching every packet
    fn default() -> Self {
        MatchingRule {
            protocol: ipv4_protocol::NONE,
            dst_cidr: Ipv4Cidr::default(),
            dst_port: port::INVALID,
        }
    }
}

impl fmt::Display for MatchingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.protocol == ipv4_protocol::NONE {
            write!(f, "*-")?;
        } else {
            write!(f, "{}-", self.protocol)?;
        }
        write!(f, "{}-", self.dst_cidr)?;
        if self.dst_port == port::INVALID {
            write!(f, "*")
        } else {
            write!(f, "{}", self.dst_port)
        }
    }
}

impl FromStr for MatchingRule {
    type Err = NetError;

    fn from_str(s: &str) -> NetResult<Self> {
        const CONTEXT: &str = "MatchingRule::from_str";

        let mut parts = s.trim().splitn(3, '-');
        let proto_part = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| NetError::invalid_argument(CONTEXT, "missing protocol number"))?;
        let cidr_part = parts
            .next()
            .ok_or_else(|| NetError::invalid_argument(CONTEXT, "missing CIDR"))?;
        let port_part = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| NetError::invalid_argument(CONTEXT, "missing port number"))?;

        let protocol = if proto_part == "*" {
            ipv4_protocol::NONE
        } else {
            let value: u64 = proto_part.parse().map_err(|_| {
                NetError::invalid_argument(CONTEXT, format!("bad protocol {proto_part:?}"))
            })?;
            if value > 255 {
                return Err(NetError::invalid_argument(CONTEXT, "protocol number > 255"));
            }
            value as u8
        };

        if !cidr_part.contains('/') {
            return Err(NetError::invalid_argument(CONTEXT, "missing CIDR mask"));
        }
        let dst_cidr: Ipv4Cidr = cidr_part.parse()?;

        let dst_port = if port_part == "*" {
            port::INVALID
        } else {
            let value: u64 = port_part.parse().map_err(|_| {
                NetError::invalid_argument(CONTEXT, format!("bad port {port_part:?}"))
            })?;
            if value > 65535 {
                return Err(NetError::invalid_argument(CONTEXT, "port number > 65535"));
            }
            value as u16
        };

        Ok(MatchingRule {
            protocol,
            dst_cidr,
            dst_port,
        })
    }
}

impl MatchingRule {
    /// True iff this rule matches the packet.
    ///
    /// Extracting the destination port decodes the L4 header, so a
    /// truncated payload surfaces as a decode error.
    pub fn matches(&self, ipv4: &Ipv4Decoder<'_>) -> NetResult<bool> {
        if self.protocol != ipv4_protocol::NONE && self.protocol != ipv4.protocol() {
            return Ok(false);
        }

        if !self.dst_cidr.match_address(ipv4.dst_address()) {
            return Ok(false);
        }

        if self.dst_port != port::INVALID {
            let packet_port = if ipv4.is_tcp() {
                TcpDecoder::new(ipv4.data()?)?.dst_port()
            } else if ipv4.is_udp() {
                UdpDecoder::new(ipv4.data()?)?.dst_port()
            } else if ipv4.is_sctp() {
                SctpDecoder::new(ipv4.data()?)?.dst_port()
            } else {
                port::INVALID
            };

            if self.dst_port != packet_port {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// An ordered list of matching rules.
pub struct RuleMatcher {
    rules: Vec<MatchingRule>,
}

impl RuleMatcher {
    /// Position value meaning "the end of the list"
    pub const END_POSITION: usize = usize::MAX;

    pub fn new() -> Self {
        RuleMatcher { rules: Vec::new() }
    }

    /// True iff any rule matches the packet.
    pub fn matches(&self, ipv4: &Ipv4Decoder<'_>) -> NetResult<bool> {
        for rule in &self.rules {
            if rule.matches(ipv4)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Insert a rule at `position` (0 = first). `END_POSITION`, or any
    /// position past the end, appends.
    pub fn add_rule(&mut self, rule: MatchingRule, position: usize) {
        if position >= self.rules.len() {
            self.rules.push(rule);
        } else {
            self.rules.insert(position, rule);
        }
    }

    /// Delete the rule at `position` (0 = first). `END_POSITION`, or
    /// any position past the end, deletes the last rule.
    pub fn del_rule(&mut self, position: usize) {
        if position >= self.rules.len() {
            self.rules.pop();
        } else {
            self.rules.remove(position);
        }
    }

    /// Remove every rule.
    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    pub fn rules(&self) -> &[MatchingRule] {
        &self.rules
    }
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self::new()
    }
}
