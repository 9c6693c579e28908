//! S1-AP message projections
//!
//! The router only cares about the Initial Context Setup procedure, and
//! within it only about the identifiers and tunnel endpoints. The ASN.1
//! layer projects each relevant PDU into these flat records.
//!
//! Value ranges, from 3GPP TS 36.413:
//!
//! - `MME-UE-S1AP-ID ::= INTEGER (0..4294967295)` fits a `u32`.
//! - `ENB-UE-S1AP-ID ::= INTEGER (0..16777215)` fits a `u32`.
//! - `E-RAB-ID ::= INTEGER (0..15, ...)` fits a `u8`.
//! - `TransportLayerAddress ::= BIT STRING (SIZE(1..160, ...))`: we
//!   handle the 32-bit IPv4 form only.
//! - `GTP-TEID ::= OCTET STRING (SIZE (4))` is a `u32`.

use std::net::Ipv4Addr;

use upf_net::Teid;

/// One E-RAB item of an Initial Context Setup Request.
///
/// Requests travel MME → eNodeB, so the transport layer address names
/// the EPC-side GTP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialContextSetupRequest {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub e_rab_id: u8,

    /// EPC-side IPv4 address of the tunnel
    pub transport_layer_address: Ipv4Addr,

    /// TEID of the UE → EPC direction
    pub gtp_teid: Teid,

    /// The IPv4 address assigned to the UE
    pub ue_address: Ipv4Addr,
}

/// One E-RAB item of an Initial Context Setup Response.
///
/// Responses travel eNodeB → MME, so the transport layer address names
/// the eNodeB-side GTP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialContextSetupResponse {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub e_rab_id: u8,

    /// eNodeB-side IPv4 address of the tunnel
    pub transport_layer_address: Ipv4Addr,

    /// TEID of the EPC → UE direction
    pub gtp_teid: Teid,
}

/// A decoded S1AP-PDU, projected down to what the router consumes.
///
/// A single PDU may carry several E-RAB items; in practice it is almost
/// always exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S1apPdu {
    InitialContextSetupRequest(Vec<InitialContextSetupRequest>),
    InitialContextSetupResponse(Vec<InitialContextSetupResponse>),
    /// Any other S1-AP procedure: valid traffic, nothing to extract
    Other,
}

impl S1apPdu {
    /// True when this PDU carries Initial Context Setup information
    pub fn is_relevant(&self) -> bool {
        !matches!(self, S1apPdu::Other)
    }
}
