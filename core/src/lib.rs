//! HTTP client core that negotiates NTLM and Basic authentication.
//!
//! # Overview
//! A logical request may need several physical round trips: an NTLM
//! handshake, a Basic retry, redirects. `Negotiator` decides each step from
//! the previous response without touching the network (host-does-IO
//! pattern); `NtlmClient` drives it over a `Transport`, by default `ureq`.
//!
//! # Design
//! - `hash` and `message` are pure: password hashes, challenge responses and
//!   the Type1/Type2/Type3 wire format.
//! - `negotiator` owns all per-request state. Credentials leave it the moment
//!   they are folded into an `Authorization` header.
//! - Types use owned `String` / `Vec` fields so the FFI crate can hold them
//!   behind opaque handles.

pub mod client;
pub mod config;
pub mod cookie;
pub mod error;
pub mod flags;
pub mod hash;
pub mod http;
pub mod message;
pub mod negotiator;
pub mod redirect;
pub mod transport;
pub mod types;
pub mod wire;

pub use client::NtlmClient;
pub use config::ClientConfig;
pub use cookie::{CookieStore, MemoryCookieJar};
pub use error::{DecodeError, EncodeError, NtlmError};
pub use flags::NegotiateFlags;
pub use http::{Headers, HttpMethod, HttpRequest};
pub use message::{
    build_basic_token, build_type1, build_type3, build_type3_with, parse_type2, NtlmVersion,
    StringEncoding, TargetInfo, TargetInfoKind, Type2Challenge,
};
pub use negotiator::{AuthScheme, Decision, Negotiator, Phase, MAX_REQUESTS};
pub use transport::{Transport, TransportResponse, UreqTransport};
pub use types::{Credentials, NtlmResponse, RequestOptions};
pub use ureq::tls::TlsConfig;
