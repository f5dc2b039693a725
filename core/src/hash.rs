//! Password hashes and challenge responses for NTLM v1 and v2.
//!
//! Every function here is pure and deterministic except the two entropy
//! helpers at the bottom and `ntlm_timestamp`. Inputs that legacy servers
//! expect to be tolerated (over-long LM passwords) are normalised, never
//! rejected.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use rand::RngCore;

use crate::wire::utf16le;

type HmacMd5 = Hmac<Md5>;

/// Plaintext the LM hash encrypts with each password half.
const LM_MAGIC: &[u8; 8] = b"KGS!@#$%";

/// Milliseconds between 1601-01-01 and the Unix epoch.
const EPOCH_DIFF_MILLIS: i64 = 11_644_473_600_000;

/// Longest password the LM hash can represent.
pub const LM_PASSWORD_MAX: usize = 14;

/// LM hash of `password`.
///
/// Passwords longer than 14 characters cannot be LM-hashed; they yield sixteen
/// zero bytes, which is what Windows clients send in that case.
pub fn lm_hash(password: &str) -> [u8; 16] {
    let mut hash = [0u8; 16];
    if password.chars().count() > LM_PASSWORD_MAX {
        return hash;
    }

    let mut key = [0u8; LM_PASSWORD_MAX];
    for (dst, src) in key.iter_mut().zip(password.to_uppercase().chars()) {
        *dst = u8::try_from(u32::from(src)).unwrap_or(b'?');
    }

    hash[..8].copy_from_slice(&des_encrypt(&key[..7], LM_MAGIC));
    hash[8..].copy_from_slice(&des_encrypt(&key[7..], LM_MAGIC));
    hash
}

/// NT hash: MD4 of the UTF-16LE password.
pub fn ntlm_hash(password: &str) -> [u8; 16] {
    Md4::digest(utf16le(password)).into()
}

/// Spread a 56-bit key over eight bytes, seven key bits per byte in the high
/// bits, and set each low bit so the byte has odd parity.
pub fn des_key_expand(key: &[u8; 7]) -> [u8; 8] {
    let bits = key.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    let mut expanded = [0u8; 8];
    for (i, byte) in expanded.iter_mut().enumerate() {
        let seven = ((bits >> (49 - 7 * i)) & 0x7f) as u8;
        let shifted = seven << 1;
        *byte = shifted | u8::from(shifted.count_ones() % 2 == 0);
    }
    expanded
}

/// Single-block DES-ECB with a 7-byte key.
fn des_encrypt(key: &[u8], block: &[u8; 8]) -> [u8; 8] {
    let mut key7 = [0u8; 7];
    key7.copy_from_slice(&key[..7]);
    let cipher = Des::new(GenericArray::from_slice(&des_key_expand(&key7)));
    let mut out = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    out.into()
}

/// LM or NTLM v1 response: the hash, zero-padded to 21 bytes, is cut into
/// three DES keys that each encrypt the server challenge.
pub fn lm_or_ntlm_response(hash: &[u8; 16], challenge: &[u8; 8]) -> [u8; 24] {
    let mut padded = [0u8; 21];
    padded[..16].copy_from_slice(hash);

    let mut response = [0u8; 24];
    for (chunk, out) in padded.chunks(7).zip(response.chunks_mut(8)) {
        out.copy_from_slice(&des_encrypt(chunk, challenge));
    }
    response
}

/// NTLMv2 hash: HMAC-MD5 over UTF-16LE(uppercase(username) + target).
///
/// The target name keeps its case.
pub fn ntlm_v2_hash(ntlm_hash: &[u8; 16], username: &str, target_name: &str) -> [u8; 16] {
    let identity = format!("{}{}", username.to_uppercase(), target_name);
    hmac_md5(ntlm_hash, &[&utf16le(&identity)])
}

/// LMv2 response: HMAC-MD5(challenge ‖ client nonce) followed by the nonce.
pub fn lm_v2_response(challenge: &[u8; 8], ntlm_v2_hash: &[u8; 16], client_nonce: &[u8; 8]) -> [u8; 24] {
    let digest = hmac_md5(ntlm_v2_hash, &[challenge, client_nonce]);
    let mut response = [0u8; 24];
    response[..16].copy_from_slice(&digest);
    response[16..].copy_from_slice(client_nonce);
    response
}

/// NTLMv2 response stamped with the current time.
pub fn ntlm_v2_response(
    challenge: &[u8; 8],
    ntlm_v2_hash: &[u8; 16],
    client_nonce: &[u8; 8],
    target_info: &[u8],
) -> Vec<u8> {
    ntlm_v2_response_at(challenge, ntlm_v2_hash, client_nonce, target_info, ntlm_timestamp())
}

/// NTLMv2 response for an explicit timestamp (100ns ticks since 1601).
///
/// Layout: HMAC digest (16) ‖ blob, where the blob is signature `01 01 00 00`,
/// four reserved zeros, the timestamp, the client nonce, four zeros, the
/// server's raw target info and four trailing zeros.
pub fn ntlm_v2_response_at(
    challenge: &[u8; 8],
    ntlm_v2_hash: &[u8; 16],
    client_nonce: &[u8; 8],
    target_info: &[u8],
    timestamp: u64,
) -> Vec<u8> {
    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&0x0101_0000u32.to_be_bytes());
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(client_nonce);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0u8; 4]);

    let digest = hmac_md5(ntlm_v2_hash, &[challenge, &blob]);
    let mut response = Vec::with_capacity(16 + blob.len());
    response.extend_from_slice(&digest);
    response.extend_from_slice(&blob);
    response
}

/// Current time as 100-nanosecond ticks since 1601-01-01.
pub fn ntlm_timestamp() -> u64 {
    let millis = chrono::Utc::now().timestamp_millis();
    ((millis + EPOCH_DIFF_MILLIS) * 10_000) as u64
}

/// `length` random hex characters. Not suitable where unpredictability
/// matters; only used when no nonce is injected.
pub fn random_nonce(length: usize) -> String {
    let mut bytes = vec![0u8; length.div_ceil(2)];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut nonce = hex::encode(bytes);
    nonce.truncate(length);
    nonce
}

/// Eight random bytes for the LMv2/NTLMv2 client challenge.
pub fn client_nonce() -> [u8; 8] {
    let mut nonce = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> [u8; 16] {
    let mut mac = <HmacMd5 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}
