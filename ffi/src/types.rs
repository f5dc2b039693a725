//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, pointer/length pairs instead of `Vec`,
//! and tagged enums with explicit discriminants. Conversion functions live
//! here to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use ntlm_core::{Decision, Headers, HttpMethod, HttpRequest, NtlmError, Phase};

/// Opaque handle to a parsed Type2 challenge.
pub struct FfiChallenge {
    pub(crate) inner: ntlm_core::Type2Challenge,
}

/// Opaque handle to the per-request state machine.
pub struct FfiNegotiator {
    pub(crate) inner: ntlm_core::Negotiator,
}

// ---------------------------------------------------------------------------
// String helpers
// ---------------------------------------------------------------------------

/// Copy a Rust string into a heap C string owned by the caller. Interior NUL
/// bytes are dropped.
pub(crate) fn to_c_string(s: impl Into<String>) -> *mut c_char {
    let mut s = s.into();
    s.retain(|c| c != '\0');
    CString::new(s).unwrap_or_default().into_raw()
}

/// Borrow a caller-owned C string. Null and invalid UTF-8 read as `None`.
pub(crate) fn from_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Head = 1,
    Post = 2,
    Put = 3,
    Patch = 4,
    Delete = 5,
    Options = 6,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Head => FfiHttpMethod::Head,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Patch => FfiHttpMethod::Patch,
            HttpMethod::Delete => FfiHttpMethod::Delete,
            HttpMethod::Options => FfiHttpMethod::Options,
        }
    }
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Head => HttpMethod::Head,
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Patch => HttpMethod::Patch,
            FfiHttpMethod::Delete => HttpMethod::Delete,
            FfiHttpMethod::Options => HttpMethod::Options,
        }
    }
}

/// A single HTTP header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// Read a caller-owned header array into core `Headers`. Entries with a null
/// or non-UTF-8 key or value are skipped.
pub(crate) fn headers_from_c(headers: *const FfiHeader, len: u32) -> Headers {
    if headers.is_null() || len == 0 {
        return Headers::new();
    }
    let slice = unsafe { std::slice::from_raw_parts(headers, len as usize) };
    slice
        .iter()
        .filter_map(|h| Some((from_c_str(h.key)?, from_c_str(h.value)?)))
        .collect()
}

/// Everything needed to start a negotiator, filled in by the C caller.
///
/// Only `url` is required. Null credential fields mean "not supplied";
/// `max_requests == 0` selects the built-in limit.
#[repr(C)]
pub struct FfiRequestOptions {
    pub url: *const c_char,
    pub method: FfiHttpMethod,
    pub headers: *const FfiHeader,
    pub headers_len: u32,
    pub body: *const u8,
    pub body_len: u32,
    pub user: *const c_char,
    pub password: *const c_char,
    pub workstation: *const c_char,
    pub domain: *const c_char,
    pub disable_redirect: bool,
    pub max_requests: u32,
}

/// An HTTP request described as C-compatible plain data.
///
/// Produced by `ntlm_negotiator_next_request`. The C caller sends it, on the
/// pinned connection when `pinned` is true, and reports the response through
/// `ntlm_negotiator_on_response`.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub url: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut u8,
    pub body_len: u32,
    pub pinned: bool,
}

impl FfiHttpRequest {
    pub(crate) fn from_core(req: HttpRequest, pinned: bool) -> Box<Self> {
        let headers_len = req.headers.len() as u32;
        let headers = if req.headers.is_empty() {
            std::ptr::null_mut()
        } else {
            let ffi_headers: Box<[FfiHeader]> = req
                .headers
                .iter()
                .map(|(k, v)| FfiHeader {
                    key: to_c_string(k),
                    value: to_c_string(v),
                })
                .collect();
            Box::into_raw(ffi_headers) as *mut FfiHeader
        };

        let (body, body_len) = match req.body {
            Some(bytes) if !bytes.is_empty() => {
                let len = bytes.len() as u32;
                (Box::into_raw(bytes.into_boxed_slice()) as *mut u8, len)
            }
            _ => (std::ptr::null_mut(), 0),
        };

        Box::new(FfiHttpRequest {
            method: req.method.into(),
            url: to_c_string(req.url),
            headers,
            headers_len,
            body,
            body_len,
            pinned,
        })
    }

    /// Release every heap field. The struct itself is freed by the caller.
    pub(crate) fn free_fields(&self) {
        if !self.url.is_null() {
            drop(unsafe { CString::from_raw(self.url) });
        }
        if !self.headers.is_null() && self.headers_len > 0 {
            let headers = unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    self.headers,
                    self.headers_len as usize,
                ))
            };
            for h in headers.iter() {
                if !h.key.is_null() {
                    drop(unsafe { CString::from_raw(h.key) });
                }
                if !h.value.is_null() {
                    drop(unsafe { CString::from_raw(h.value) });
                }
            }
        }
        if !self.body.is_null() && self.body_len > 0 {
            drop(unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    self.body,
                    self.body_len as usize,
                ))
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Response input (caller-provided, not heap-allocated by us)
// ---------------------------------------------------------------------------

/// Status and headers of a response the C caller received.
///
/// The FFI layer reads but does not free these fields. The body is never
/// needed: the caller drains it unless the decision is `Resolve`.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub headers: *const FfiHeader,
    pub headers_len: u32,
}

// ---------------------------------------------------------------------------
// Negotiator outputs
// ---------------------------------------------------------------------------

/// What to do with the response just reported.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiDecisionKind {
    /// Open a pinned connection, drain the body, then ask for the next request.
    NtlmStep1 = 0,
    /// Drain the body; the next request answers the challenge.
    NtlmStep2 = 1,
    /// Drain the body; the next request carries Basic credentials.
    Basic = 2,
    /// Drain the body; the next request goes to `url`.
    Redirect = 3,
    /// The response is final. Read its body and release any pinned connection.
    Resolve = 4,
}

/// A decision plus the redirect target when there is one.
#[repr(C)]
pub struct FfiDecision {
    pub kind: FfiDecisionKind,
    pub url: *mut c_char,
}

impl FfiDecision {
    pub(crate) fn from_core(decision: Decision) -> Box<Self> {
        let (kind, url) = match decision {
            Decision::NtlmStep1 => (FfiDecisionKind::NtlmStep1, std::ptr::null_mut()),
            Decision::NtlmStep2 => (FfiDecisionKind::NtlmStep2, std::ptr::null_mut()),
            Decision::Basic => (FfiDecisionKind::Basic, std::ptr::null_mut()),
            Decision::Redirect { url } => (FfiDecisionKind::Redirect, to_c_string(url)),
            Decision::Resolve => (FfiDecisionKind::Resolve, std::ptr::null_mut()),
        };
        Box::new(FfiDecision { kind, url })
    }
}

/// Negotiator phase as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiPhase {
    Initial = 0,
    NtlmStep1 = 1,
    NtlmStep2 = 2,
    Basic = 3,
    Redirecting = 4,
    Resolved = 5,
    Failed = 6,
}

impl From<Phase> for FfiPhase {
    fn from(p: Phase) -> Self {
        match p {
            Phase::Initial => FfiPhase::Initial,
            Phase::NtlmStep1 => FfiPhase::NtlmStep1,
            Phase::NtlmStep2 => FfiPhase::NtlmStep2,
            Phase::Basic => FfiPhase::Basic,
            Phase::Redirecting => FfiPhase::Redirecting,
            Phase::Resolved => FfiPhase::Resolved,
            Phase::Failed => FfiPhase::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Result envelope
// ---------------------------------------------------------------------------

/// Error codes returned in `FfiNtlmResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    Decode = 1,
    LoopLimitExceeded = 2,
    InvalidLocation = 3,
    ChainFinished = 4,
    Transport = 5,
    Timeout = 6,
    Panic = 7,
    NullArg = 8,
    Encode = 9,
}

/// Tag that tells `ntlm_free_result` what `FfiNtlmResult::data` points to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiDataTag {
    None = 0,
    Challenge = 1,
    Request = 2,
    Decision = 3,
}

/// Result envelope for every fallible operation.
///
/// On success `error_code` is `Ok`, `error_message` is null, and `data`
/// points to the payload named by `data_tag`.
/// On failure `error_code` describes the category, `error_message` is a
/// human-readable C string, and `data` is null.
#[repr(C)]
pub struct FfiNtlmResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub data_tag: FfiDataTag,
    pub data: *mut std::ffi::c_void,
}

impl FfiNtlmResult {
    fn ok(data_tag: FfiDataTag, data: *mut std::ffi::c_void) -> *mut Self {
        Box::into_raw(Box::new(FfiNtlmResult {
            error_code: FfiErrorCode::Ok,
            error_message: std::ptr::null_mut(),
            data_tag,
            data,
        }))
    }

    fn err(error_code: FfiErrorCode, msg: impl Into<String>) -> *mut Self {
        Box::into_raw(Box::new(FfiNtlmResult {
            error_code,
            error_message: to_c_string(msg),
            data_tag: FfiDataTag::None,
            data: std::ptr::null_mut(),
        }))
    }

    pub(crate) fn ok_challenge(challenge: ntlm_core::Type2Challenge) -> *mut Self {
        let handle = Box::new(FfiChallenge { inner: challenge });
        Self::ok(FfiDataTag::Challenge, Box::into_raw(handle).cast())
    }

    pub(crate) fn ok_request(request: Box<FfiHttpRequest>) -> *mut Self {
        Self::ok(FfiDataTag::Request, Box::into_raw(request).cast())
    }

    pub(crate) fn ok_decision(decision: Decision) -> *mut Self {
        Self::ok(FfiDataTag::Decision, Box::into_raw(FfiDecision::from_core(decision)).cast())
    }

    /// Build an error result from an `NtlmError`.
    pub(crate) fn from_error(err: NtlmError) -> *mut Self {
        let code = match &err {
            NtlmError::Decode(_) => FfiErrorCode::Decode,
            NtlmError::Encode(_) => FfiErrorCode::Encode,
            NtlmError::LoopLimitExceeded { .. } => FfiErrorCode::LoopLimitExceeded,
            NtlmError::InvalidLocation { .. } => FfiErrorCode::InvalidLocation,
            NtlmError::ChainFinished => FfiErrorCode::ChainFinished,
            NtlmError::Transport(_) => FfiErrorCode::Transport,
            NtlmError::Timeout => FfiErrorCode::Timeout,
        };
        Self::err(code, err.to_string())
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::err(FfiErrorCode::NullArg, format!("null argument: {name}"))
    }

    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::err(FfiErrorCode::Panic, msg)
    }
}
