//! Chains driven over a scripted transport.
//!
//! Each test queues the responses a server would send and then checks what
//! the client asked for: URLs, methods, headers, and which requests went over
//! the pinned connection. No sockets are involved.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ntlm_core::{
    AuthScheme, ClientConfig, CookieStore, Credentials, Headers, HttpMethod, HttpRequest,
    MemoryCookieJar, NtlmClient, NtlmError, RequestOptions, Transport, TransportResponse,
};

#[derive(Clone)]
struct Scripted {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: &'static str,
}

fn respond(status: u16, headers: &[(&'static str, &str)], body: &'static str) -> Scripted {
    Scripted {
        status,
        headers: headers.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        body,
    }
}

#[derive(Debug, Clone)]
struct Sent {
    request: HttpRequest,
    pinned: bool,
}

#[derive(Default)]
struct Log {
    sent: Vec<Sent>,
    opened: u32,
    released: u32,
}

/// Replays queued responses; the last one repeats once the queue runs dry.
/// `None` entries simulate a connection failure.
struct ScriptedTransport {
    script: Mutex<VecDeque<Option<Scripted>>>,
    log: Arc<Mutex<Log>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Option<Scripted>>) -> (Self, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let transport = Self {
            script: Mutex::new(script.into()),
            log: log.clone(),
        };
        (transport, log)
    }
}

impl Transport for ScriptedTransport {
    type Connection = u32;

    fn open_persistent(&self) -> Result<u32, NtlmError> {
        let mut log = self.log.lock().unwrap();
        log.opened += 1;
        Ok(log.opened)
    }

    fn send(&self, request: &HttpRequest, connection: Option<&u32>) -> Result<TransportResponse, NtlmError> {
        self.log.lock().unwrap().sent.push(Sent {
            request: request.clone(),
            pinned: connection.is_some(),
        });

        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        };
        let scripted = next.ok_or_else(|| {
            NtlmError::from(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
        })?;

        let headers: Headers = scripted.headers.into_iter().collect();
        Ok(TransportResponse::new(scripted.status, headers, scripted.body.as_bytes()))
    }

    fn release(&self, _connection: u32) {
        self.log.lock().unwrap().released += 1;
    }
}

fn client(script: Vec<Option<Scripted>>) -> (NtlmClient<ScriptedTransport>, Arc<Mutex<Log>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (transport, log) = ScriptedTransport::new(script);
    (NtlmClient::with_transport(transport, ClientConfig::default()), log)
}

fn credentials() -> Credentials {
    Credentials::new("user", "pwd").with_workstation("WS")
}

fn type2_header() -> String {
    // v1 OEM challenge for target DOMAIN.
    let mut msg = vec![0u8; 48];
    msg[..8].copy_from_slice(b"NTLMSSP\0");
    msg[8..12].copy_from_slice(&2u32.to_le_bytes());
    msg[12..14].copy_from_slice(&6u16.to_le_bytes());
    msg[14..16].copy_from_slice(&6u16.to_le_bytes());
    msg[16..20].copy_from_slice(&48u32.to_le_bytes());
    msg[20..24].copy_from_slice(&0x206u32.to_le_bytes());
    msg[24..32].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
    msg.extend_from_slice(b"DOMAIN");
    format!("NTLM {}", STANDARD.encode(msg))
}

fn authorization(sent: &Sent) -> Option<&str> {
    sent.request.headers.get("Authorization")
}

#[test]
fn ok_on_first_response() {
    let (client, log) = client(vec![Some(respond(200, &[], "ok"))]);
    let response = client.request("http://mock").unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "ok");
    assert_eq!(response.request_count, 1);
    assert_eq!(log.lock().unwrap().sent.len(), 1);
}

#[test]
fn basic_retry_sends_token_once() {
    let (client, log) = client(vec![
        Some(respond(401, &[("www-authenticate", "basic")], "")),
        Some(respond(200, &[], "in")),
    ]);
    let options = RequestOptions::new("http://mock").credentials(credentials());
    let response = client.request(options).unwrap();

    assert_eq!(response.auth_methods, vec![AuthScheme::Basic]);
    assert_eq!(response.request_count, 2);

    let log = log.lock().unwrap();
    assert_eq!(authorization(&log.sent[0]), None);
    assert_eq!(authorization(&log.sent[1]), Some("Basic dXNlcjpwd2Q="));
    assert_eq!(log.opened, 0);
}

#[test]
fn ntlm_handshake_uses_pinned_connection_and_releases_it() {
    let challenge = type2_header();
    let (client, log) = client(vec![
        Some(respond(401, &[("www-authenticate", "NTLM")], "denied")),
        Some(respond(401, &[("www-authenticate", challenge.as_str())], "")),
        Some(respond(200, &[], "welcome")),
    ]);
    let options = RequestOptions::new("http://mock").credentials(credentials());
    let response = client.request(options).unwrap();

    assert_eq!(response.text(), "welcome");
    assert_eq!(response.request_count, 3);

    let log = log.lock().unwrap();
    let pinned: Vec<bool> = log.sent.iter().map(|s| s.pinned).collect();
    assert_eq!(pinned, vec![false, true, true]);
    assert!(authorization(&log.sent[1]).unwrap().starts_with("NTLM TlRMTVNTUAAB"));
    assert!(authorization(&log.sent[2]).unwrap().starts_with("NTLM TlRMTVNTUAAD"));
    assert_eq!((log.opened, log.released), (1, 1));
}

#[test]
fn connection_is_released_when_challenge_is_malformed() {
    let bad = format!("NTLM {}", STANDARD.encode(b"NTLMSSP\0\x03\0\0\0"));
    let (client, log) = client(vec![
        Some(respond(401, &[("www-authenticate", "NTLM")], "")),
        Some(respond(401, &[("www-authenticate", bad.as_str())], "")),
    ]);
    let options = RequestOptions::new("http://mock").credentials(credentials());
    let err = client.request(options).unwrap_err();

    assert!(matches!(
        err,
        NtlmError::Decode(ntlm_core::DecodeError::WrongMessageType(3))
    ));
    let log = log.lock().unwrap();
    assert_eq!((log.opened, log.released), (1, 1));
}

#[test]
fn connection_is_released_on_transport_failure() {
    let (client, log) = client(vec![
        Some(respond(401, &[("www-authenticate", "NTLM")], "")),
        None,
    ]);
    let options = RequestOptions::new("http://mock").credentials(credentials());
    let err = client.request(options).unwrap_err();

    assert!(matches!(err, NtlmError::Transport(_)));
    let log = log.lock().unwrap();
    assert_eq!((log.opened, log.released), (1, 1));
}

#[test]
fn connection_is_released_at_the_loop_limit() {
    let (client, log) = client(vec![
        Some(respond(401, &[("www-authenticate", "NTLM")], "")),
        Some(respond(302, &[("location", "/again")], "")),
    ]);
    let options = RequestOptions::new("http://mock/start").credentials(credentials());
    let err = client.request(options).unwrap_err();

    assert!(matches!(err, NtlmError::LoopLimitExceeded { limit: 20 }));
    let log = log.lock().unwrap();
    assert_eq!(log.sent.len(), 20);
    assert_eq!((log.opened, log.released), (1, 1));
}

#[test]
fn basic_credentials_are_not_sent_to_another_host() {
    let (client, log) = client(vec![
        Some(respond(401, &[("www-authenticate", "Basic realm=\"x\"")], "")),
        Some(respond(302, &[("location", "http://elsewhere.example/steal")], "")),
        Some(respond(200, &[], "")),
    ]);
    let options = RequestOptions::new("http://mock/start").credentials(credentials());
    let response = client.request(options).unwrap();

    assert_eq!(response.request_count, 3);
    assert_eq!(response.request_headers.get("authorization"), None);
    let log = log.lock().unwrap();
    assert_eq!(authorization(&log.sent[1]), Some("Basic dXNlcjpwd2Q="));
    assert_eq!(log.sent[2].request.url, "http://elsewhere.example/steal");
    assert_eq!(authorization(&log.sent[2]), None);
}

#[test]
fn moved_permanently_turns_post_into_get() {
    let (client, log) = client(vec![
        Some(respond(301, &[("location", "http://redirect")], "")),
        Some(respond(200, &[], "")),
    ]);
    let options = RequestOptions::new("http://mock").method(HttpMethod::Post).body("data");
    let response = client.request(options).unwrap();

    assert_eq!(response.url, "http://redirect");
    assert_eq!(response.method, HttpMethod::Get);
    assert_eq!(response.request_count, 2);
    let log = log.lock().unwrap();
    assert_eq!(log.sent[1].request.method, HttpMethod::Get);
    assert_eq!(log.sent[1].request.url, "http://redirect");
}

#[test]
fn temporary_redirect_preserves_post() {
    let (client, log) = client(vec![
        Some(respond(307, &[("location", "http://redirect")], "")),
        Some(respond(200, &[], "")),
    ]);
    let options = RequestOptions::new("http://mock").method(HttpMethod::Post).body("data");
    let response = client.request(options).unwrap();

    assert_eq!(response.method, HttpMethod::Post);
    let log = log.lock().unwrap();
    assert_eq!(log.sent[1].request.body.as_deref(), Some(&b"data"[..]));
}

#[test]
fn relative_locations_resolve_against_current_url() {
    for (location, expected) in [
        ("/redirect", "http://mock/redirect"),
        ("redirect.html", "http://mock/original/redirect.html"),
    ] {
        let (client, _) = client(vec![
            Some(respond(301, &[("location", location)], "")),
            Some(respond(200, &[], "")),
        ]);
        let response = client.request("http://mock/original/f.html").unwrap();
        assert_eq!(response.url, expected, "{location}");
    }
}

#[test]
fn cookies_flow_through_the_store() {
    let jar = Arc::new(MemoryCookieJar::new());
    jar.store_set_cookie("existing=1", "http://mock/");
    let (client, log) = client(vec![
        Some(respond(302, &[("set-cookie", "session=abc; Path=/"), ("location", "/home")], "")),
        Some(respond(200, &[], "")),
    ]);
    let client = client.with_cookie_store(jar.clone());
    client.request("http://mock/login").unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.sent[0].request.headers.get("cookie"), Some("existing=1"));
    assert_eq!(
        log.sent[1].request.headers.get("cookie"),
        Some("existing=1; session=abc")
    );
}

#[test]
fn bodies_of_intermediate_responses_are_not_returned() {
    let (client, _) = client(vec![
        Some(respond(302, &[("location", "/next")], "intermediate")),
        Some(respond(200, &[], "final")),
    ]);
    let response = client.request("http://mock/").unwrap();
    assert_eq!(response.text(), "final");
}
