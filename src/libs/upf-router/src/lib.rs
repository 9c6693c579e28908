//! UPF router library
//!
//! The stateful core of the UPF: the [`Router`] correlates S1-AP
//! Initial Context Setup Request/Response pairs into the UE map, the
//! [`GtpEncapSink`] encapsulates plain IPv4 traffic of known UEs into
//! GTPv1-U tunnels, and the [`RuleMatcher`] selects traffic by
//! protocol, destination CIDR and destination port.

pub mod encap_sink;
pub mod router;
pub mod rule;

pub use encap_sink::{GtpEncapSink, USER_DATA_TO_ENB, USER_DATA_TO_EPC, USER_DATA_UNKNOWN_UE};
pub use router::{GtpTunnelInfo, Router, RouterCore, UeMap, UeMapEntry, UeMapHandle};
pub use rule::{MatchingRule, RuleMatcher};
