//! Protocol engine for a SIP-over-UDP diagnostic probe.
//!
//! The crate renders OPTIONS and REGISTER requests, parses responses,
//! answers HTTP Digest challenges (MD5) and sequences the probes through a
//! [`Prober`]. Socket I/O is left to a [`Transport`] implementation.

use thiserror::Error;

pub mod auth;
pub mod hash;
pub mod ids;
pub mod message;
pub mod probe;
pub mod response;
pub mod transport;

pub use auth::{
    authorization_header, build_authorization, extract_challenge, extract_proxy_challenge,
    parse_www_authenticate, ChallengeOrigin, Credentials, DigestChallenge, NonceCount,
};
pub use hash::{digest, hex, md5_hex, HexDigest, Md5Hasher};
pub use ids::IdGenerator;
pub use message::{build_options, build_register, Endpoint, Header, Method, Request, RequestIds};
pub use probe::{
    ProbeConfig, ProbeFailure, ProbeOutcome, ProbeReport, ProbeState, Prober, RegisterConfig,
};
pub use response::{parse_response, SipResponse};
pub use transport::{Reply, Transport};

/// Default SIP port; omitted from rendered URIs.
pub const DEFAULT_SIP_PORT: u16 = 5060;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SipError {
    #[error("invalid: {0}")]
    Invalid(&'static str),
}

pub type Result<T> = std::result::Result<T, SipError>;
