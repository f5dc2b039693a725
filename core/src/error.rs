//! Error types for the NTLM client.
//!
//! # Design
//! Decoding failures of a server's Type2 challenge get their own enum because
//! they all abort the chain the same way; callers that care can match on the
//! inner `DecodeError`. Non-2xx statuses are never errors here: a chain that
//! cannot authenticate resolves with whatever the server returned.

use thiserror::Error;

/// Errors raised while decoding an NTLM Type2 (challenge) message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The challenge token is not valid base64.
    #[error("challenge is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The first eight bytes are not `NTLMSSP\0`.
    #[error("invalid NTLM message signature")]
    BadSignature,

    /// The message type field is not 2.
    #[error("invalid NTLM message type {0} (expected type 2)")]
    WrongMessageType(u32),

    /// The buffer ends before a fixed header field.
    #[error("NTLM type 2 message truncated at {0} bytes")]
    Truncated(usize),

    /// A security buffer points outside the message or into its header.
    #[error("bad type 2 message: security buffer out of bounds")]
    BadTargetBuffer,

    /// The response that should carry the challenge has no `WWW-Authenticate` header.
    #[error("response carries no NTLM challenge")]
    MissingChallenge,
}

/// Errors raised while building an outgoing NTLM message.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A security buffer holds at most `u16::MAX` bytes.
    #[error("NTLM message field at offset {field} is {len} bytes, limit is 65535")]
    FieldTooLong { field: usize, len: usize },
}

/// Errors that abort a request chain.
#[derive(Debug, Error)]
pub enum NtlmError {
    /// Connection or I/O failure in the transport. Never retried.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The transport gave up waiting for the server.
    #[error("request timed out")]
    Timeout,

    /// The chain issued more physical requests than allowed.
    #[error("request chain exceeded {limit} round trips")]
    LoopLimitExceeded { limit: u32 },

    /// The server's Type2 challenge could not be decoded.
    #[error("failed to decode NTLM challenge: {0}")]
    Decode(#[from] DecodeError),

    /// An outgoing Type1 or Type3 message could not be built.
    #[error("failed to build NTLM message: {0}")]
    Encode(#[from] EncodeError),

    /// A redirect `Location` could not be resolved against the current URL.
    #[error("cannot resolve redirect location {location:?}: {source}")]
    InvalidLocation {
        location: String,
        #[source]
        source: url::ParseError,
    },

    /// The negotiator already resolved or failed and cannot issue more requests.
    #[error("request chain already finished")]
    ChainFinished,
}

impl NtlmError {
    /// Wrap any transport-level error.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        NtlmError::Transport(err.into())
    }
}

impl From<std::io::Error> for NtlmError {
    fn from(err: std::io::Error) -> Self {
        NtlmError::transport(err)
    }
}
