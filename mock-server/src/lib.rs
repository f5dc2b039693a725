//! Server side of the Basic and NTLM handshakes, for integration tests.
//!
//! NTLM challenges are keyed by the peer address, so a Type3 only succeeds on
//! the connection that received the matching Type2. Serve the app with
//! `into_make_service_with_connect_info::<SocketAddr>()` (see `run`).

use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex};
use uuid::Uuid;

pub const USER: &str = "user";
pub const PASSWORD: &str = "pwd";
pub const TARGET: &str = "DOMAIN";
pub const SESSION_COOKIE: &str = "session";

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";
const V2_FLAGS: u32 = 0x0088_8205;
const LEGACY_FLAGS: u32 = 0x0000_0206;

/// How long `/slow` waits before answering.
pub const SLOW_RESPONSE: Duration = Duration::from_secs(3);

/// Echoed back by `/echo` so tests can see what the client sent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Echo {
    pub method: String,
    pub authorization: Option<String>,
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct AppState {
    challenges: Arc<Mutex<HashMap<SocketAddr, Challenge>>>,
    sessions: Arc<Mutex<HashSet<String>>>,
}

#[derive(Clone, Copy, Debug)]
struct Challenge {
    legacy: bool,
}

#[derive(Clone, Copy)]
struct NtlmRoute {
    advertise: &'static str,
    legacy: bool,
}

const NTLM_V2: NtlmRoute = NtlmRoute {
    advertise: "Negotiate, NTLM",
    legacy: false,
};
const NTLM_LEGACY: NtlmRoute = NtlmRoute {
    advertise: "NTLM",
    legacy: true,
};
const BOTH: NtlmRoute = NtlmRoute {
    advertise: "Basic realm=\"mock\", NTLM",
    legacy: false,
};

pub fn app() -> Router {
    Router::new()
        .route("/hello", get(|| async { "hello" }))
        .route("/echo", any(echo))
        .route("/slow", get(slow))
        .route("/basic", any(basic))
        .route("/ntlm", any(ntlm_v2))
        .route("/ntlm/legacy", any(ntlm_legacy))
        .route("/both", any(ntlm_or_basic))
        .route("/bad-challenge", any(bad_challenge))
        .route("/redirect/permanent", any(|| async { redirect(StatusCode::MOVED_PERMANENTLY, "/echo") }))
        .route("/redirect/absolute", any(absolute_redirect))
        .route("/redirect/temporary", any(|| async { redirect(StatusCode::TEMPORARY_REDIRECT, "/echo") }))
        .route("/redirect/relative", any(|| async { redirect(StatusCode::FOUND, "target") }))
        .route("/redirect/target", get(|| async { "redirected" }))
        .route("/redirect/ntlm", any(|| async { redirect(StatusCode::FOUND, "/ntlm") }))
        .route("/loop", any(|| async { redirect(StatusCode::MOVED_PERMANENTLY, "/loop") }))
        .route("/cookie/login", get(cookie_login))
        .route("/cookie/check", get(cookie_check))
        .with_state(AppState::default())
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(
        listener,
        app().into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn unauthorized(www_authenticate: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, www_authenticate.to_string())],
        "unauthorized",
    )
        .into_response()
}

fn redirect(status: StatusCode, location: &'static str) -> Response {
    (status, [(header::LOCATION, location)], "moved").into_response()
}

/// 301 to `/echo` on the same host, spelled as an absolute URL.
async fn absolute_redirect(headers: HeaderMap) -> Response {
    let host = header_str(&headers, header::HOST).unwrap_or("localhost");
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, format!("http://{host}/echo"))],
        "moved",
    )
        .into_response()
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        authorization: header_str(&headers, header::AUTHORIZATION).map(str::to_string),
        cookie: header_str(&headers, header::COOKIE).map(str::to_string),
        user_agent: header_str(&headers, header::USER_AGENT).map(str::to_string),
        body,
    })
}

async fn slow() -> &'static str {
    tokio::time::sleep(SLOW_RESPONSE).await;
    "late"
}

async fn basic(headers: HeaderMap) -> Response {
    let expected = format!("Basic {}", STANDARD.encode(format!("{USER}:{PASSWORD}")));
    match header_str(&headers, header::AUTHORIZATION) {
        Some(auth) if auth == expected => format!("welcome {USER}").into_response(),
        _ => unauthorized("Basic realm=\"mock\""),
    }
}

async fn ntlm_v2(
    state: State<AppState>,
    peer: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    ntlm(NTLM_V2, state, peer, headers).await
}

async fn ntlm_legacy(
    state: State<AppState>,
    peer: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    ntlm(NTLM_LEGACY, state, peer, headers).await
}

async fn ntlm_or_basic(
    state: State<AppState>,
    peer: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    ntlm(BOTH, state, peer, headers).await
}

async fn ntlm(
    route: NtlmRoute,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(message) = header_str(&headers, header::AUTHORIZATION)
        .and_then(|auth| auth.strip_prefix("NTLM "))
        .and_then(|token| STANDARD.decode(token).ok())
    else {
        return unauthorized(route.advertise);
    };

    match message_type(&message) {
        Some(1) => {
            state
                .challenges
                .lock()
                .await
                .insert(peer, Challenge { legacy: route.legacy });
            let type2 = if route.legacy {
                legacy_challenge()
            } else {
                v2_challenge()
            };
            unauthorized(&format!("NTLM {}", STANDARD.encode(type2)))
        }
        Some(3) => {
            let Some(challenge) = state.challenges.lock().await.remove(&peer) else {
                // Type3 arrived on a connection that never got a challenge.
                return unauthorized(route.advertise);
            };
            match authenticated_user(&message, challenge.legacy) {
                Some(user) if user == USER => format!("welcome {user}").into_response(),
                _ => unauthorized(route.advertise),
            }
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn bad_challenge(headers: HeaderMap) -> Response {
    if headers.contains_key(header::AUTHORIZATION) {
        unauthorized(&format!("NTLM {}", STANDARD.encode(b"NOTNTLM\0\x02\0\0\0")))
    } else {
        unauthorized("NTLM")
    }
}

async fn cookie_login(State(state): State<AppState>) -> Response {
    let session = Uuid::new_v4().to_string();
    state.sessions.lock().await.insert(session.clone());
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, "/cookie/check".to_string()),
            (header::SET_COOKIE, format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly")),
        ],
        "logged in",
    )
        .into_response()
}

async fn cookie_check(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = header_str(&headers, header::COOKIE).and_then(|cookies| {
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.to_string())
    });
    let known = match &session {
        Some(session) => state.sessions.lock().await.contains(session),
        None => false,
    };
    if known {
        "session ok".into_response()
    } else {
        (StatusCode::FORBIDDEN, "no session").into_response()
    }
}

fn message_type(message: &[u8]) -> Option<u32> {
    if message.len() < 12 || &message[..8] != SIGNATURE {
        return None;
    }
    Some(u32::from_le_bytes(message[8..12].try_into().ok()?))
}

/// User name from a Type3 message; UTF-16LE for v2 handshakes, OEM for legacy.
fn authenticated_user(message: &[u8], legacy: bool) -> Option<String> {
    let len = u16::from_le_bytes(message.get(36..38)?.try_into().ok()?) as usize;
    let offset = u32::from_le_bytes(message.get(40..44)?.try_into().ok()?) as usize;
    let bytes = message.get(offset..offset.checked_add(len)?)?;
    if legacy {
        Some(bytes.iter().map(|&b| char::from(b)).collect())
    } else {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).ok()
    }
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn server_nonce() -> [u8; 8] {
    let mut nonce = [0u8; 8];
    nonce.copy_from_slice(&Uuid::new_v4().as_bytes()[..8]);
    nonce
}

/// Type2 with a 48-byte header, the target name, then an optional target info block.
fn type2(flags: u32, target: &[u8], target_info: &[u8]) -> Vec<u8> {
    let mut msg = vec![0u8; 48];
    msg[..8].copy_from_slice(SIGNATURE);
    msg[8..12].copy_from_slice(&2u32.to_le_bytes());

    let target_offset = msg.len() as u32;
    msg[12..14].copy_from_slice(&(target.len() as u16).to_le_bytes());
    msg[14..16].copy_from_slice(&(target.len() as u16).to_le_bytes());
    msg[16..20].copy_from_slice(&target_offset.to_le_bytes());
    msg[20..24].copy_from_slice(&flags.to_le_bytes());
    msg[24..32].copy_from_slice(&server_nonce());
    msg.extend_from_slice(target);

    let info_offset = msg.len() as u32;
    msg[40..42].copy_from_slice(&(target_info.len() as u16).to_le_bytes());
    msg[42..44].copy_from_slice(&(target_info.len() as u16).to_le_bytes());
    msg[44..48].copy_from_slice(&info_offset.to_le_bytes());
    msg.extend_from_slice(target_info);
    msg
}

fn target_info() -> Vec<u8> {
    let mut block = Vec::new();
    for (kind, value) in [(2u16, TARGET), (1, "SERVER"), (4, "domain.com"), (3, "server.domain.com")] {
        let value = utf16le(value);
        block.extend_from_slice(&kind.to_le_bytes());
        block.extend_from_slice(&(value.len() as u16).to_le_bytes());
        block.extend_from_slice(&value);
    }
    block.extend_from_slice(&[0u8; 4]);
    block
}

fn v2_challenge() -> Vec<u8> {
    type2(V2_FLAGS, &utf16le(TARGET), &target_info())
}

fn legacy_challenge() -> Vec<u8> {
    type2(LEGACY_FLAGS, TARGET.as_bytes(), &[])
}
