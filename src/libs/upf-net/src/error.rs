//! Network library error types

use thiserror::Error;

/// Error type shared by buffers, decoders, encapsulators and the
/// processor pipeline.
///
/// Every variant carries a `context` tag naming the method that detected
/// the problem, so errors read like `"Ipv4Decoder::new: buffer too short
/// (need 20 bytes, have 12)"` when printed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// Buffer too small for a header or a declared payload length
    #[error("{context}: buffer too short (need {needed} bytes, have {available})")]
    TooShort {
        needed: usize,
        available: usize,
        context: &'static str,
    },

    /// A header field fails an invariant
    #[error("{context}: malformed data ({detail})")]
    Malformed {
        context: &'static str,
        detail: String,
    },

    /// A checked accessor rejected an index
    #[error("{context}: offset {offset} + length {length} out of bounds (size {size})")]
    OutOfBounds {
        offset: usize,
        length: usize,
        size: usize,
        context: &'static str,
    },

    /// Pool exhausted, or a payload exceeds the encapsulation buffer
    #[error("{context}: capacity exceeded (need {needed}, have {available})")]
    CapacityExceeded {
        needed: usize,
        available: usize,
        context: &'static str,
    },

    /// Textual parse failure (IPv4 address, CIDR, matching rule)
    #[error("{context}: invalid argument ({detail})")]
    InvalidArgument {
        context: &'static str,
        detail: String,
    },

    /// External collaborator failure (pcap files, raw sockets)
    #[error("{context}: I/O error ({cause})")]
    Io {
        context: &'static str,
        cause: String,
    },
}

impl NetError {
    /// Wrap a `std::io::Error` with a method-name tag.
    pub fn io(context: &'static str, err: std::io::Error) -> Self {
        NetError::Io {
            context,
            cause: err.to_string(),
        }
    }

    /// Build a `Malformed` error from anything printable.
    pub fn malformed(context: &'static str, detail: impl Into<String>) -> Self {
        NetError::Malformed {
            context,
            detail: detail.into(),
        }
    }

    /// Build an `InvalidArgument` error from anything printable.
    pub fn invalid_argument(context: &'static str, detail: impl Into<String>) -> Self {
        NetError::InvalidArgument {
            context,
            detail: detail.into(),
        }
    }
}

/// Result type used throughout the network library
pub type NetResult<T> = Result<T, NetError>;
