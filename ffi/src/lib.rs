//! C-ABI wrapper around `ntlm-core`.
//!
//! # Overview
//! Exposes the NTLM/Basic message codec and the sans-IO negotiator through
//! `extern "C"` functions, so a host in any language with a C FFI can run the
//! authentication handshake while doing the HTTP I/O itself.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Token builders return plain C strings; anything that can fail returns a
//!   single `FfiNtlmResult` envelope with `FfiDataTag` + `void* data`.
//! - Parsed challenges and negotiators are opaque handles.
//! - The C caller owns all returned pointers and must call the matching
//!   `ntlm_*_free` function to release them.
//!
//! # Driving a chain
//! ```text
//! neg = ntlm_negotiator_new(&options)
//! loop:
//!     r = ntlm_negotiator_next_request(neg, cookie)   // data_tag Request
//!     send it (on one kept-alive socket when request->pinned)
//!     d = ntlm_negotiator_on_response(neg, &response) // data_tag Decision
//!     Resolve => read body, stop; anything else => drain body, continue
//! ```

pub mod types;

use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::catch_unwind;

use log::debug;
use ntlm_core::{AuthScheme, Credentials, RequestOptions, MAX_REQUESTS};

use types::*;

// ---------------------------------------------------------------------------
// Token builders
// ---------------------------------------------------------------------------

/// Build an `NTLM <base64>` Type1 (negotiate) header value.
///
/// Both arguments may be null; a null workstation means the local host name.
/// Returns null if either value is too long to encode.
/// The caller must free the returned string with `ntlm_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_build_type1(
    workstation: *const c_char,
    domain: *const c_char,
) -> *mut c_char {
    catch_unwind(|| {
        match ntlm_core::build_type1(from_c_str(workstation), from_c_str(domain)) {
            Ok(token) => to_c_string(token),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Build a `Basic <base64(user:password)>` header value.
///
/// Returns null if either argument is null.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_build_basic(user: *const c_char, password: *const c_char) -> *mut c_char {
    catch_unwind(|| match (from_c_str(user), from_c_str(password)) {
        (Some(user), Some(password)) => to_c_string(ntlm_core::build_basic_token(user, password)),
        _ => std::ptr::null_mut(),
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Parse a Type2 challenge from a `WWW-Authenticate` value.
///
/// Accepts bare base64, `NTLM <base64>`, or a multi-scheme value.
/// Returns a result with `data_tag = Challenge` on success; the handle is
/// released together with the result.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_type2_parse(header: *const c_char) -> *mut FfiNtlmResult {
    catch_unwind(|| {
        let Some(header) = from_c_str(header) else {
            return FfiNtlmResult::null_arg("header");
        };
        match ntlm_core::parse_type2(header) {
            Ok(challenge) => FfiNtlmResult::ok_challenge(challenge),
            Err(e) => FfiNtlmResult::from_error(e.into()),
        }
    })
    .unwrap_or_else(|_| FfiNtlmResult::panic("panic in ntlm_type2_parse"))
}

/// Negotiated NTLM version of a parsed challenge: 1 or 2, or 0 for null.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_challenge_version(challenge: *const FfiChallenge) -> u8 {
    if challenge.is_null() {
        return 0;
    }
    catch_unwind(|| unsafe { &*challenge }.inner.version as u8).unwrap_or(0)
}

/// Raw negotiate flags of a parsed challenge, or 0 for null.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_challenge_flags(challenge: *const FfiChallenge) -> u32 {
    if challenge.is_null() {
        return 0;
    }
    catch_unwind(|| unsafe { &*challenge }.inner.flags.bits()).unwrap_or(0)
}

/// Target name of a parsed challenge. Free with `ntlm_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_challenge_target_name(challenge: *const FfiChallenge) -> *mut c_char {
    if challenge.is_null() {
        return std::ptr::null_mut();
    }
    catch_unwind(|| to_c_string(unsafe { &*challenge }.inner.target_name.as_str()))
        .unwrap_or(std::ptr::null_mut())
}

/// Build an `NTLM <base64>` Type3 (authenticate) header value answering
/// `challenge`.
///
/// `workstation` and `domain` may be null; they default to the local host
/// name and the challenge's target name. Returns null if `challenge`, `user`
/// or `password` is null, or if a field is too long to encode.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_build_type3(
    challenge: *const FfiChallenge,
    user: *const c_char,
    password: *const c_char,
    workstation: *const c_char,
    domain: *const c_char,
) -> *mut c_char {
    catch_unwind(|| {
        if challenge.is_null() {
            return std::ptr::null_mut();
        }
        let (Some(user), Some(password)) = (from_c_str(user), from_c_str(password)) else {
            return std::ptr::null_mut();
        };
        let challenge = unsafe { &*challenge };
        let token = ntlm_core::build_type3(
            &challenge.inner,
            user,
            password,
            from_c_str(workstation),
            from_c_str(domain),
        );
        match token {
            Ok(token) => to_c_string(token),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Negotiator lifecycle
// ---------------------------------------------------------------------------

fn options_from_c(options: &FfiRequestOptions) -> Option<(RequestOptions, u32)> {
    let url = from_c_str(options.url)?;
    let mut request = RequestOptions::new(url)
        .method(options.method.into())
        .disable_redirect(options.disable_redirect);

    for (name, value) in headers_from_c(options.headers, options.headers_len).iter() {
        request = request.header(name, value);
    }
    if !options.body.is_null() && options.body_len > 0 {
        let body = unsafe { std::slice::from_raw_parts(options.body, options.body_len as usize) };
        request = request.body(body.to_vec());
    }
    if let (Some(user), Some(password)) = (from_c_str(options.user), from_c_str(options.password)) {
        let mut credentials = Credentials::new(user, password);
        if let Some(workstation) = from_c_str(options.workstation) {
            credentials = credentials.with_workstation(workstation);
        }
        if let Some(domain) = from_c_str(options.domain) {
            credentials = credentials.with_domain(domain);
        }
        request = request.credentials(credentials);
    }

    let max_requests = match options.max_requests {
        0 => MAX_REQUESTS,
        n => n,
    };
    Some((request, max_requests))
}

/// Start a negotiator for one logical request.
///
/// Returns null if `options` or `options->url` is null, or on panic.
/// The caller must free the returned pointer with `ntlm_negotiator_free`.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_negotiator_new(options: *const FfiRequestOptions) -> *mut FfiNegotiator {
    catch_unwind(|| {
        if options.is_null() {
            return std::ptr::null_mut();
        }
        let Some((request, max_requests)) = options_from_c(unsafe { &*options }) else {
            return std::ptr::null_mut();
        };
        debug!("ffi negotiator for {}", request.url);
        let inner = ntlm_core::Negotiator::new(request, max_requests);
        Box::into_raw(Box::new(FfiNegotiator { inner }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a negotiator created by `ntlm_negotiator_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_negotiator_free(negotiator: *mut FfiNegotiator) {
    if !negotiator.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(negotiator) });
        });
    }
}

/// Build the next request of the chain.
///
/// `cookie` may be null. Returns a result with `data_tag = Request`, or an
/// error once the request limit is exceeded or the chain has finished.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_negotiator_next_request(
    negotiator: *mut FfiNegotiator,
    cookie: *const c_char,
) -> *mut FfiNtlmResult {
    catch_unwind(|| {
        if negotiator.is_null() {
            return FfiNtlmResult::null_arg("negotiator");
        }
        let negotiator = unsafe { &mut *negotiator };
        match negotiator.inner.next_request(from_c_str(cookie)) {
            Ok(request) => {
                let pinned = negotiator
                    .inner
                    .state()
                    .auth_methods
                    .contains(&AuthScheme::Ntlm);
                FfiNtlmResult::ok_request(FfiHttpRequest::from_core(request, pinned))
            }
            Err(e) => FfiNtlmResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiNtlmResult::panic("panic in ntlm_negotiator_next_request"))
}

/// Report the status and headers of the response to the last request.
///
/// Returns a result with `data_tag = Decision` on success.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_negotiator_on_response(
    negotiator: *mut FfiNegotiator,
    response: *const FfiHttpResponse,
) -> *mut FfiNtlmResult {
    catch_unwind(|| {
        if negotiator.is_null() {
            return FfiNtlmResult::null_arg("negotiator");
        }
        if response.is_null() {
            return FfiNtlmResult::null_arg("response");
        }
        let negotiator = unsafe { &mut *negotiator };
        let response = unsafe { &*response };
        let headers = headers_from_c(response.headers, response.headers_len);
        match negotiator.inner.on_response(response.status, &headers) {
            Ok(decision) => FfiNtlmResult::ok_decision(decision),
            Err(e) => FfiNtlmResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiNtlmResult::panic("panic in ntlm_negotiator_on_response"))
}

/// Mark the chain failed after an I/O error on the caller's side.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_negotiator_abort(negotiator: *mut FfiNegotiator) {
    if !negotiator.is_null() {
        let _ = catch_unwind(|| unsafe { &mut *negotiator }.inner.abort());
    }
}

/// Current phase of the negotiator. A null handle reads as `Failed`.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_negotiator_phase(negotiator: *const FfiNegotiator) -> FfiPhase {
    if negotiator.is_null() {
        return FfiPhase::Failed;
    }
    catch_unwind(|| unsafe { &*negotiator }.inner.phase().into()).unwrap_or(FfiPhase::Failed)
}

/// Physical requests issued so far.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_negotiator_request_count(negotiator: *const FfiNegotiator) -> u32 {
    if negotiator.is_null() {
        return 0;
    }
    catch_unwind(|| unsafe { &*negotiator }.inner.state().request_count).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiNtlmResult`. Safe to call with null. Uses `data_tag` to
/// determine what `data` points to.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_free_result(result: *mut FfiNtlmResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        if !result.error_message.is_null() {
            drop(unsafe { CString::from_raw(result.error_message) });
        }
        if result.data.is_null() {
            return;
        }
        match result.data_tag {
            FfiDataTag::Challenge => {
                drop(unsafe { Box::from_raw(result.data as *mut FfiChallenge) });
            }
            FfiDataTag::Request => {
                let request = unsafe { Box::from_raw(result.data as *mut FfiHttpRequest) };
                request.free_fields();
            }
            FfiDataTag::Decision => {
                let decision = unsafe { Box::from_raw(result.data as *mut FfiDecision) };
                if !decision.url.is_null() {
                    drop(unsafe { CString::from_raw(decision.url) });
                }
            }
            FfiDataTag::None => {}
        }
    });
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn ntlm_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::ffi::{CStr, CString};

    fn read(s: *mut c_char) -> String {
        let out = unsafe { CStr::from_ptr(s) }.to_str().unwrap().to_string();
        ntlm_free_string(s);
        out
    }

    fn options(url: &CString) -> FfiRequestOptions {
        FfiRequestOptions {
            url: url.as_ptr(),
            method: FfiHttpMethod::Get,
            headers: std::ptr::null(),
            headers_len: 0,
            body: std::ptr::null(),
            body_len: 0,
            user: std::ptr::null(),
            password: std::ptr::null(),
            workstation: std::ptr::null(),
            domain: std::ptr::null(),
            disable_redirect: false,
            max_requests: 0,
        }
    }

    /// Type2 v1 challenge for target "DOMAIN" with OEM strings.
    fn challenge_header() -> String {
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

    fn header(key: &str, value: &str) -> FfiHeader {
        FfiHeader {
            key: CString::new(key).unwrap().into_raw(),
            value: CString::new(value).unwrap().into_raw(),
        }
    }

    fn free_header(h: FfiHeader) {
        drop(unsafe { CString::from_raw(h.key) });
        drop(unsafe { CString::from_raw(h.value) });
    }

    fn respond(neg: *mut FfiNegotiator, status: u16, headers: &[FfiHeader]) -> FfiDecisionKind {
        let response = FfiHttpResponse {
            status,
            headers: headers.as_ptr(),
            headers_len: headers.len() as u32,
        };
        let result = ntlm_negotiator_on_response(neg, &response);
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Ok);
        assert_eq!(r.data_tag, FfiDataTag::Decision);
        let kind = unsafe { &*(r.data as *const FfiDecision) }.kind;
        ntlm_free_result(result);
        kind
    }

    fn authorization_of(result: *mut FfiNtlmResult) -> Option<String> {
        let r = unsafe { &*result };
        let req = unsafe { &*(r.data as *const FfiHttpRequest) };
        if req.headers.is_null() {
            return None;
        }
        let headers = unsafe { std::slice::from_raw_parts(req.headers, req.headers_len as usize) };
        headers.iter().find_map(|h| {
            let key = unsafe { CStr::from_ptr(h.key) }.to_str().unwrap();
            key.eq_ignore_ascii_case("authorization")
                .then(|| unsafe { CStr::from_ptr(h.value) }.to_str().unwrap().to_string())
        })
    }

    #[test]
    fn build_type1_has_ntlm_prefix() {
        let ws = CString::new("WS").unwrap();
        let token = read(ntlm_build_type1(ws.as_ptr(), std::ptr::null()));
        assert!(token.starts_with("NTLM TlRMTVNTUAAB"));
    }

    #[test]
    fn build_type1_with_oversized_workstation_returns_null() {
        let ws = CString::new("W".repeat(70_000)).unwrap();
        assert!(ntlm_build_type1(ws.as_ptr(), std::ptr::null()).is_null());
    }

    #[test]
    fn build_basic_encodes_user_and_password() {
        let user = CString::new("user").unwrap();
        let pwd = CString::new("pwd").unwrap();
        assert_eq!(read(ntlm_build_basic(user.as_ptr(), pwd.as_ptr())), "Basic dXNlcjpwd2Q=");
        assert!(ntlm_build_basic(std::ptr::null(), pwd.as_ptr()).is_null());
    }

    #[test]
    fn type2_parse_exposes_challenge_fields() {
        let header = CString::new(challenge_header()).unwrap();
        let result = ntlm_type2_parse(header.as_ptr());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Ok);
        assert_eq!(r.data_tag, FfiDataTag::Challenge);

        let challenge = r.data as *const FfiChallenge;
        assert_eq!(ntlm_challenge_version(challenge), 1);
        assert_eq!(ntlm_challenge_flags(challenge), 0x206);
        assert_eq!(read(ntlm_challenge_target_name(challenge)), "DOMAIN");

        let user = CString::new("user").unwrap();
        let pwd = CString::new("pwd").unwrap();
        let ws = CString::new("WS").unwrap();
        let token = read(ntlm_build_type3(
            challenge,
            user.as_ptr(),
            pwd.as_ptr(),
            ws.as_ptr(),
            std::ptr::null(),
        ));
        assert!(token.starts_with("NTLM TlRMTVNTUAAD"));

        ntlm_free_result(result);
    }

    #[test]
    fn type2_parse_reports_decode_errors() {
        let header = CString::new("NTLM AAAA").unwrap();
        let result = ntlm_type2_parse(header.as_ptr());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Decode);
        assert!(!r.error_message.is_null());
        assert!(r.data.is_null());
        ntlm_free_result(result);
    }

    #[test]
    fn type2_parse_null_is_null_arg() {
        let result = ntlm_type2_parse(std::ptr::null());
        assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::NullArg);
        ntlm_free_result(result);
    }

    #[test]
    fn build_type3_null_challenge_returns_null() {
        let user = CString::new("user").unwrap();
        let token = ntlm_build_type3(
            std::ptr::null(),
            user.as_ptr(),
            user.as_ptr(),
            std::ptr::null(),
            std::ptr::null(),
        );
        assert!(token.is_null());
    }

    #[test]
    fn negotiator_new_requires_url() {
        assert!(ntlm_negotiator_new(std::ptr::null()).is_null());
        let url = CString::new("http://mock").unwrap();
        let mut opts = options(&url);
        opts.url = std::ptr::null();
        assert!(ntlm_negotiator_new(&opts).is_null());
    }

    #[test]
    fn negotiator_drives_ntlm_handshake() {
        let url = CString::new("http://mock/protected").unwrap();
        let user = CString::new("user").unwrap();
        let pwd = CString::new("pwd").unwrap();
        let ws = CString::new("WS").unwrap();
        let mut opts = options(&url);
        opts.user = user.as_ptr();
        opts.password = pwd.as_ptr();
        opts.workstation = ws.as_ptr();
        let neg = ntlm_negotiator_new(&opts);
        assert!(!neg.is_null());

        let first = ntlm_negotiator_next_request(neg, std::ptr::null());
        let req = unsafe { &*(unsafe { &*first }.data as *const FfiHttpRequest) };
        assert_eq!(req.method, FfiHttpMethod::Get);
        assert_eq!(unsafe { CStr::from_ptr(req.url) }.to_str().unwrap(), "http://mock/protected");
        assert!(!req.pinned);
        assert!(authorization_of(first).is_none());
        ntlm_free_result(first);

        let advertise = [header("WWW-Authenticate", "NTLM")];
        assert_eq!(respond(neg, 401, &advertise), FfiDecisionKind::NtlmStep1);
        assert_eq!(ntlm_negotiator_phase(neg), FfiPhase::NtlmStep1);

        let second = ntlm_negotiator_next_request(neg, std::ptr::null());
        assert!(unsafe { &*(unsafe { &*second }.data as *const FfiHttpRequest) }.pinned);
        assert!(authorization_of(second).unwrap().starts_with("NTLM TlRMTVNTUAAB"));
        ntlm_free_result(second);

        let challenge = [header("WWW-Authenticate", &challenge_header())];
        assert_eq!(respond(neg, 401, &challenge), FfiDecisionKind::NtlmStep2);

        let third = ntlm_negotiator_next_request(neg, std::ptr::null());
        assert!(authorization_of(third).unwrap().starts_with("NTLM TlRMTVNTUAAD"));
        ntlm_free_result(third);

        assert_eq!(respond(neg, 200, &[]), FfiDecisionKind::Resolve);
        assert_eq!(ntlm_negotiator_phase(neg), FfiPhase::Resolved);
        assert_eq!(ntlm_negotiator_request_count(neg), 3);

        let finished = ntlm_negotiator_next_request(neg, std::ptr::null());
        assert_eq!(unsafe { &*finished }.error_code, FfiErrorCode::ChainFinished);
        ntlm_free_result(finished);

        advertise.into_iter().chain(challenge).for_each(free_header);
        ntlm_negotiator_free(neg);
    }

    #[test]
    fn negotiator_reports_redirect_target() {
        let url = CString::new("http://mock/original/f.html").unwrap();
        let body = b"payload";
        let mut opts = options(&url);
        opts.method = FfiHttpMethod::Post;
        opts.body = body.as_ptr();
        opts.body_len = body.len() as u32;
        let neg = ntlm_negotiator_new(&opts);

        let first = ntlm_negotiator_next_request(neg, std::ptr::null());
        let req = unsafe { &*(unsafe { &*first }.data as *const FfiHttpRequest) };
        let sent = unsafe { std::slice::from_raw_parts(req.body, req.body_len as usize) };
        assert_eq!(sent, body);
        ntlm_free_result(first);

        let location = [header("Location", "redirect.html")];
        let response = FfiHttpResponse {
            status: 301,
            headers: location.as_ptr(),
            headers_len: 1,
        };
        let result = ntlm_negotiator_on_response(neg, &response);
        let decision = unsafe { &*(unsafe { &*result }.data as *const FfiDecision) };
        assert_eq!(decision.kind, FfiDecisionKind::Redirect);
        assert_eq!(
            unsafe { CStr::from_ptr(decision.url) }.to_str().unwrap(),
            "http://mock/original/redirect.html"
        );
        ntlm_free_result(result);

        let second = ntlm_negotiator_next_request(neg, std::ptr::null());
        let req = unsafe { &*(unsafe { &*second }.data as *const FfiHttpRequest) };
        assert_eq!(req.method, FfiHttpMethod::Get);
        assert!(req.body.is_null());
        ntlm_free_result(second);

        location.into_iter().for_each(free_header);
        ntlm_negotiator_free(neg);
    }

    #[test]
    fn negotiator_enforces_request_limit() {
        let url = CString::new("http://mock/loop").unwrap();
        let mut opts = options(&url);
        opts.max_requests = 2;
        let neg = ntlm_negotiator_new(&opts);
        let location = [header("Location", "/loop")];

        for _ in 0..2 {
            let request = ntlm_negotiator_next_request(neg, std::ptr::null());
            assert_eq!(unsafe { &*request }.error_code, FfiErrorCode::Ok);
            ntlm_free_result(request);
            assert_eq!(respond(neg, 302, &location), FfiDecisionKind::Redirect);
        }
        let over = ntlm_negotiator_next_request(neg, std::ptr::null());
        assert_eq!(unsafe { &*over }.error_code, FfiErrorCode::LoopLimitExceeded);
        ntlm_free_result(over);

        location.into_iter().for_each(free_header);
        ntlm_negotiator_free(neg);
    }

    #[test]
    fn cookie_is_attached_to_the_request() {
        let url = CString::new("http://mock").unwrap();
        let neg = ntlm_negotiator_new(&options(&url));
        let cookie = CString::new("session=abc").unwrap();
        let result = ntlm_negotiator_next_request(neg, cookie.as_ptr());
        let req = unsafe { &*(unsafe { &*result }.data as *const FfiHttpRequest) };
        assert_eq!(req.headers_len, 1);
        let h = unsafe { &*req.headers };
        assert_eq!(unsafe { CStr::from_ptr(h.value) }.to_str().unwrap(), "session=abc");
        ntlm_free_result(result);
        ntlm_negotiator_free(neg);
    }

    #[test]
    fn abort_marks_failed() {
        let url = CString::new("http://mock").unwrap();
        let neg = ntlm_negotiator_new(&options(&url));
        ntlm_negotiator_abort(neg);
        assert_eq!(ntlm_negotiator_phase(neg), FfiPhase::Failed);
        ntlm_negotiator_free(neg);
    }

    #[test]
    fn null_handles_are_safe() {
        ntlm_negotiator_free(std::ptr::null_mut());
        ntlm_negotiator_abort(std::ptr::null_mut());
        ntlm_free_result(std::ptr::null_mut());
        ntlm_free_string(std::ptr::null_mut());
        assert_eq!(ntlm_negotiator_phase(std::ptr::null()), FfiPhase::Failed);
        assert_eq!(ntlm_challenge_version(std::ptr::null()), 0);

        let result = ntlm_negotiator_next_request(std::ptr::null_mut(), std::ptr::null());
        assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::NullArg);
        ntlm_free_result(result);
    }
}
