//! NTLM Type1/Type3 construction, Type2 parsing and the Basic token.
//!
//! Tokens travel in the `Authorization` / `WWW-Authenticate` headers as
//! `NTLM <base64>`. Field offsets are named constants so the fixed headers
//! stay in step with `wire::MessageWriter`.

use std::collections::BTreeMap;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use log::warn;

use crate::error::{DecodeError, EncodeError};
use crate::flags::NegotiateFlags;
use crate::hash;
use crate::http::{Headers, WWW_AUTHENTICATE};
use crate::wire::{self, MessageReader, MessageWriter};

/// Scheme prefix of NTLM header values.
pub const NTLM_PREFIX: &str = "NTLM ";

const TYPE1_HEADER_LEN: usize = 32;
const TYPE1_DOMAIN: usize = 16;
const TYPE1_WORKSTATION: usize = 24;

const TYPE2_TARGET_NAME: usize = 12;
const TYPE2_FLAGS: usize = 20;
const TYPE2_CHALLENGE: usize = 24;
const TYPE2_TARGET_INFO: usize = 40;
/// Payload of a Type2 message may not start inside this prefix.
const TYPE2_MIN_PAYLOAD: usize = 32;

const TYPE3_V1_HEADER_LEN: usize = 52;
const TYPE3_V2_HEADER_LEN: usize = 64;
const TYPE3_LM_RESPONSE: usize = 12;
const TYPE3_NT_RESPONSE: usize = 20;
const TYPE3_TARGET_NAME: usize = 28;
const TYPE3_USER_NAME: usize = 36;
const TYPE3_WORKSTATION: usize = 44;
const TYPE3_SESSION_KEY: usize = 52;
const TYPE3_FLAGS: usize = 60;

/// Challenge tokens are accepted with or without base64 padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Character encoding of strings inside security buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    /// Single-byte OEM strings.
    Oem,
    Utf16Le,
}

impl StringEncoding {
    pub fn encode(&self, s: &str) -> Vec<u8> {
        match self {
            StringEncoding::Oem => wire::oem(s),
            StringEncoding::Utf16Le => wire::utf16le(s),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            StringEncoding::Oem => wire::from_oem(bytes),
            StringEncoding::Utf16Le => wire::from_utf16le(bytes),
        }
    }
}

/// Which response computation the server asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtlmVersion {
    /// LM and NTLM responses.
    V1 = 1,
    /// LMv2 and NTLMv2 responses.
    V2 = 2,
}

/// Sub-block kinds of the target information block we decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetInfoKind {
    Server = 1,
    Domain = 2,
    Fqdn = 3,
    Dns = 4,
    ParentDns = 5,
}

impl TargetInfoKind {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(TargetInfoKind::Server),
            2 => Some(TargetInfoKind::Domain),
            3 => Some(TargetInfoKind::Fqdn),
            4 => Some(TargetInfoKind::Dns),
            5 => Some(TargetInfoKind::ParentDns),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetInfoKind::Server => "SERVER",
            TargetInfoKind::Domain => "DOMAIN",
            TargetInfoKind::Fqdn => "FQDN",
            TargetInfoKind::Dns => "DNS",
            TargetInfoKind::ParentDns => "PARENT_DNS",
        }
    }
}

/// Decoded target information block plus its verbatim bytes, which the
/// NTLMv2 response embeds unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetInfo {
    pub entries: BTreeMap<TargetInfoKind, String>,
    pub raw: Vec<u8>,
}

impl TargetInfo {
    /// Walk `(type, length, payload)` sub-blocks until the type-0 terminator.
    /// Unknown types are skipped.
    pub fn parse(block: &[u8]) -> Result<Self, DecodeError> {
        let reader = MessageReader::new(block);
        let mut entries = BTreeMap::new();
        let mut pos = 0;

        while pos < block.len() {
            if pos + 4 > block.len() {
                return Err(DecodeError::BadTargetBuffer);
            }
            let kind = reader.read_u16(pos)?;
            let len = reader.read_u16(pos + 2)? as usize;
            pos += 4;

            if kind == 0 {
                break;
            }
            let end = pos + len;
            if end > block.len() {
                return Err(DecodeError::BadTargetBuffer);
            }
            if let Some(kind) = TargetInfoKind::from_u16(kind) {
                entries.insert(kind, wire::from_utf16le(&block[pos..end]));
            }
            pos = end;
        }

        Ok(Self {
            entries,
            raw: block.to_vec(),
        })
    }

    pub fn get(&self, kind: TargetInfoKind) -> Option<&str> {
        self.entries.get(&kind).map(String::as_str)
    }
}

/// A server's Type2 (challenge) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type2Challenge {
    pub flags: NegotiateFlags,
    pub encoding: StringEncoding,
    pub version: NtlmVersion,
    /// Server nonce.
    pub challenge: [u8; 8],
    pub target_name: String,
    pub target_info: Option<TargetInfo>,
}

impl Type2Challenge {
    /// Parse a header value: bare base64, `NTLM <base64>`, or a multi-scheme
    /// value containing an `NTLM <base64>` segment.
    pub fn parse(input: &str) -> Result<Self, DecodeError> {
        let bytes = LENIENT_BASE64.decode(challenge_token(input))?;
        Self::decode(&bytes)
    }

    /// Extract and parse the challenge from response headers.
    pub fn from_headers(headers: &Headers) -> Result<Self, DecodeError> {
        let values: Vec<&str> = headers.get_all(WWW_AUTHENTICATE).collect();
        if values.is_empty() {
            return Err(DecodeError::MissingChallenge);
        }
        Self::parse(&values.join(", "))
    }

    /// Decode the binary message.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let reader = MessageReader::new(bytes);
        if !reader.has_signature() {
            return Err(DecodeError::BadSignature);
        }
        let message_type = reader.read_u32(wire::OFFSET_MESSAGE_TYPE)?;
        if message_type != 2 {
            return Err(DecodeError::WrongMessageType(message_type));
        }

        let flags = NegotiateFlags::from_bits_retain(reader.read_u32(TYPE2_FLAGS)?);
        let encoding = if flags.contains(NegotiateFlags::NEGOTIATE_OEM) {
            StringEncoding::Oem
        } else {
            StringEncoding::Utf16Le
        };
        let version = if flags.contains(NegotiateFlags::NEGOTIATE_NTLM2_KEY) {
            NtlmVersion::V2
        } else {
            NtlmVersion::V1
        };

        let mut challenge = [0u8; 8];
        challenge.copy_from_slice(reader.bytes(TYPE2_CHALLENGE, 8)?);

        let target_name = encoding.decode(reader.security_buffer(TYPE2_TARGET_NAME, TYPE2_MIN_PAYLOAD)?);

        let target_info = if flags.contains(NegotiateFlags::NEGOTIATE_TARGET_INFO) {
            let block = reader.security_buffer(TYPE2_TARGET_INFO, TYPE2_MIN_PAYLOAD)?;
            Some(TargetInfo::parse(block)?)
        } else {
            None
        };

        Ok(Self {
            flags,
            encoding,
            version,
            challenge,
            target_name,
            target_info,
        })
    }
}

/// Free-function form of `Type2Challenge::parse`.
pub fn parse_type2(input: &str) -> Result<Type2Challenge, DecodeError> {
    Type2Challenge::parse(input)
}

/// Pick the base64 token out of a `WWW-Authenticate` value.
fn challenge_token(input: &str) -> &str {
    for segment in input.split(',') {
        let segment = segment.trim();
        if let Some((scheme, rest)) = segment.split_once(char::is_whitespace) {
            if scheme.eq_ignore_ascii_case("ntlm") {
                return rest.split_whitespace().next().unwrap_or("");
            }
        }
    }
    input.trim()
}

/// Host name sent as the workstation when the caller gives none.
pub fn local_workstation() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            warn!("cannot read local host name, sending empty workstation: {err}");
            String::new()
        }
    }
}

/// Build the Type1 (negotiate) token.
///
/// `workstation` defaults to the local host name, `target` to empty. Both are
/// written as OEM bytes after the 32-byte header, target first.
pub fn build_type1(workstation: Option<&str>, target: Option<&str>) -> Result<String, EncodeError> {
    let workstation = workstation.map_or_else(local_workstation, str::to_string);
    let target = target.unwrap_or("");

    let mut msg = MessageWriter::new(1, TYPE1_HEADER_LEN);
    msg.write_u32(12, NegotiateFlags::TYPE1.bits());
    msg.write_optional_buffer(TYPE1_DOMAIN, &wire::oem(target))?;
    msg.write_optional_buffer(TYPE1_WORKSTATION, &wire::oem(&workstation))?;

    Ok(format!("{NTLM_PREFIX}{}", STANDARD.encode(msg.into_bytes())))
}

/// Build the Type3 (authenticate) token with a fresh client nonce and the
/// current time.
pub fn build_type3(
    challenge: &Type2Challenge,
    username: &str,
    password: &str,
    workstation: Option<&str>,
    target: Option<&str>,
) -> Result<String, EncodeError> {
    build_type3_with(
        challenge,
        username,
        password,
        workstation,
        target,
        hash::client_nonce(),
        hash::ntlm_timestamp(),
    )
}

/// Build the Type3 token with an injected client nonce and timestamp. Both
/// are ignored for v1 challenges.
///
/// `workstation` defaults to the local host name and `target` to the
/// challenge's target name.
pub fn build_type3_with(
    challenge: &Type2Challenge,
    username: &str,
    password: &str,
    workstation: Option<&str>,
    target: Option<&str>,
    client_nonce: [u8; 8],
    timestamp: u64,
) -> Result<String, EncodeError> {
    let workstation = workstation.map_or_else(local_workstation, str::to_string);
    let target = target.unwrap_or(&challenge.target_name);

    let (mut msg, lm_response, nt_response) = match challenge.version {
        NtlmVersion::V1 => {
            let lm = hash::lm_or_ntlm_response(&hash::lm_hash(password), &challenge.challenge);
            let nt = hash::lm_or_ntlm_response(&hash::ntlm_hash(password), &challenge.challenge);
            (MessageWriter::new(3, TYPE3_V1_HEADER_LEN), lm.to_vec(), nt.to_vec())
        }
        NtlmVersion::V2 => {
            let v2_hash = hash::ntlm_v2_hash(&hash::ntlm_hash(password), username, target);
            let target_info = challenge
                .target_info
                .as_ref()
                .map_or(&[][..], |info| info.raw.as_slice());
            let lm = hash::lm_v2_response(&challenge.challenge, &v2_hash, &client_nonce);
            let nt = hash::ntlm_v2_response_at(
                &challenge.challenge,
                &v2_hash,
                &client_nonce,
                target_info,
                timestamp,
            );
            (MessageWriter::new(3, TYPE3_V2_HEADER_LEN), lm.to_vec(), nt)
        }
    };

    msg.write_security_buffer(TYPE3_LM_RESPONSE, &lm_response)?;
    msg.write_security_buffer(TYPE3_NT_RESPONSE, &nt_response)?;
    msg.write_security_buffer(TYPE3_TARGET_NAME, &challenge.encoding.encode(target))?;
    msg.write_security_buffer(TYPE3_USER_NAME, &challenge.encoding.encode(username))?;
    msg.write_security_buffer(TYPE3_WORKSTATION, &challenge.encoding.encode(&workstation))?;

    if challenge.version == NtlmVersion::V2 {
        // Empty session key; the header is already zeroed, offsets stay 0.
        msg.write_u16(TYPE3_SESSION_KEY, 0);
        msg.write_u32(TYPE3_FLAGS, challenge.flags.bits());
    }

    Ok(format!("{NTLM_PREFIX}{}", STANDARD.encode(msg.into_bytes())))
}

/// `Basic base64(user:password)`.
pub fn build_basic_token(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}
