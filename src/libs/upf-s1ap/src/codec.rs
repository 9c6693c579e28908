//! The codec seam towards the ASN.1 layer
//!
//! S1-AP is ASN.1 APER on the wire. The full codec is an external
//! collaborator; this crate only defines the narrow interface through
//! which already-projected records come back.

use thiserror::Error;

use crate::types::S1apPdu;

/// Failure to decode an S1AP-PDU.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum S1apCodecError {
    /// The byte stream is not a decodable S1AP-PDU
    #[error("undecodable S1AP-PDU: {0}")]
    Undecodable(String),

    /// The PDU decoded but a projected field is out of its range
    /// (e.g. a transport layer address that is not 32 bits)
    #[error("unsupported field in S1AP-PDU: {0}")]
    UnsupportedField(String),
}

/// Decodes S1AP-PDUs into the projections the router consumes.
pub trait S1apCodec {
    fn decode_pdu(&self, data: &[u8]) -> Result<S1apPdu, S1apCodecError>;
}

/// A codec for deployments without an ASN.1 backend: every PDU decodes
/// to [`S1apPdu::Other`], so S1-AP traffic flows through untouched and
/// the UE map is fed by other means.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullS1apCodec;

impl S1apCodec for NullS1apCodec {
    fn decode_pdu(&self, _data: &[u8]) -> Result<S1apPdu, S1apCodecError> {
        Ok(S1apPdu::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_codec_returns_other() {
        let codec = NullS1apCodec;
        assert_eq!(codec.decode_pdu(&[1, 2, 3]).unwrap(), S1apPdu::Other);
        assert_eq!(codec.decode_pdu(&[]).unwrap(), S1apPdu::Other);
    }
}
