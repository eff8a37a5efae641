//! GETFILE wire format.
//!
//! This module defines the framing and parsing rules shared by the client and
//! server halves of the crate: the request line, the response header, and the
//! incremental terminator scan both sides use to find the end of a header in
//! an unframed byte stream.
//!
//! # Overview
//!
//! GETFILE is a text protocol with a single method. A request is one line:
//!
//! ```text
//! GETFILE GET <path>\r\n\r\n
//! ```
//!
//! A response is a status line followed, for `OK`, by exactly `<filelen>`
//! raw body bytes:
//!
//! ```text
//! GETFILE OK <filelen>\r\n\r\n<body>
//! GETFILE <STATUS>\r\n\r\n
//! ```
//!
//! There is no length prefix on the header itself. The end of a header is the
//! four byte sequence `\r\n\r\n`, and a single read may return less than a
//! full header or a header plus the first body bytes, so callers accumulate
//! bytes and scan with [`find_terminator`] after every read. Bytes past the
//! terminator belong to the body and must not be discarded.
//!
//! # Key Components
//!
//! - [`Status`]: the closed set of response statuses.
//! - [`parse_request`] / [`parse_response`]: header parsing for each side.
//! - [`request_line`] / [`response_header`]: header formatting for each side.
//!
//! # See Also
//!
//! - [`client`](crate::client): issues requests and parses responses.
//! - [`server`](crate::server): parses requests and sends responses.
use std::fmt;

use thiserror::Error;

/// Protocol tag opening every request and response header.
pub const SCHEME: &str = "GETFILE";

/// The only supported method.
pub const METHOD: &str = "GET";

/// Four byte sequence marking the end of a header.
pub const TERMINATOR: &[u8] = b"\r\n\r\n";

/// Upper bound on header size for both sides; a stream that produces this
/// many bytes without a terminator is malformed.
pub const MAX_HEADER: usize = 4096;

/// List of possible errors raised while parsing a header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unrecognized scheme '{0}'")]
    UnknownScheme(String),

    #[error("unsupported method '{0}'")]
    UnknownMethod(String),

    #[error("path '{0}' does not begin with '/'")]
    BadPath(String),

    #[error("header has too few fields")]
    Truncated,

    #[error("header is not valid UTF-8")]
    Encoding,
}

/// Response status carried on the wire.
///
/// The set is closed; a status string the parser does not recognize maps to
/// [`Status::Invalid`] rather than an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Status {
    Ok,
    FileNotFound,
    Error,
    #[default]
    Invalid,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::FileNotFound => "FILE_NOT_FOUND",
            Status::Error => "ERROR",
            Status::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Status {
    fn from(value: &str) -> Self {
        match value {
            "OK" => Status::Ok,
            "FILE_NOT_FOUND" => Status::FileNotFound,
            "ERROR" => Status::Error,
            _ => Status::Invalid,
        }
    }
}

/// Parsed response header.
#[derive(Debug, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: Status,
    /// Declared body length; 0 when the server omitted the field.
    pub filelen: u64,
}

/// Locate the header terminator in an accumulated buffer.
///
/// Returns the index one past the terminator, i.e. the length of the header
/// including the terminator itself. Anything at or beyond that index is body
/// data.
pub fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)
        .map(|at| at + TERMINATOR.len())
}

/// Format a request line for `path`.
pub fn request_line(path: &str) -> String {
    format!("{SCHEME} {METHOD} {path}\r\n\r\n")
}

/// Format a response header. `filelen` is only meaningful for [`Status::Ok`];
/// non-success statuses carry no length field.
pub fn response_header(status: Status, filelen: u64) -> String {
    match status {
        Status::Ok => format!("{SCHEME} OK {filelen}\r\n\r\n"),
        other => format!("{SCHEME} {other}\r\n\r\n"),
    }
}

/// Parse a request header into its path.
///
/// A valid request has exactly the scheme tag, the `GET` method and a path
/// beginning with `/`. Anything else is rejected, and the caller answers
/// with [`Status::Invalid`].
pub fn parse_request(header: &[u8]) -> Result<String, CodecError> {
    let text = std::str::from_utf8(header).map_err(|_| CodecError::Encoding)?;
    let mut tokens = text.split_whitespace();

    let scheme = tokens.next().ok_or(CodecError::Truncated)?;
    if scheme != SCHEME {
        return Err(CodecError::UnknownScheme(scheme.to_string()));
    }

    let method = tokens.next().ok_or(CodecError::Truncated)?;
    if method != METHOD {
        return Err(CodecError::UnknownMethod(method.to_string()));
    }

    let path = tokens.next().ok_or(CodecError::Truncated)?;
    if !path.starts_with('/') {
        return Err(CodecError::BadPath(path.to_string()));
    }

    Ok(path.to_string())
}

/// Parse a response header.
///
/// The length field is optional; it defaults to 0 when absent or
/// non-numeric, which covers error responses that never carry one.
pub fn parse_response(header: &[u8]) -> Result<ResponseHeader, CodecError> {
    let text = std::str::from_utf8(header).map_err(|_| CodecError::Encoding)?;
    let mut tokens = text.split_whitespace();

    let scheme = tokens.next().ok_or(CodecError::Truncated)?;
    if scheme != SCHEME {
        return Err(CodecError::UnknownScheme(scheme.to_string()));
    }

    let status = Status::from(tokens.next().ok_or(CodecError::Truncated)?);
    let filelen = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0);

    Ok(ResponseHeader { status, filelen })
}
