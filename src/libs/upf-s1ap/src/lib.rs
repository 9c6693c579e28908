//! S1-AP layer for the UPF packet router
//!
//! S1-AP rides in SCTP DATA chunks with payload protocol identifier 18.
//! This crate provides the projections of the Initial Context Setup
//! procedure, the narrow interface to the external ASN.1 codec, and the
//! processor layer that feeds complete S1-AP messages to a handler.

pub mod codec;
pub mod processor;
pub mod types;

pub use codec::{NullS1apCodec, S1apCodec, S1apCodecError};
pub use processor::{S1apDecoder, S1apHandler, S1apLayer, S1apProcessor};
pub use types::{InitialContextSetupRequest, InitialContextSetupResponse, S1apPdu};
