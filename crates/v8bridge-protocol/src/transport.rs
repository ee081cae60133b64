//! Wire framing: `Content-Length` headers followed by a JSON body.
//!
//! A V8 debugger greets a new connection with a header-only frame
//! (`Type: connect`, `V8-Version: ...`, `Content-Length: 0`). Such frames
//! decode to a [`Frame`] without a body.

use crate::error::ProtocolError;

const SEPARATOR: &[u8] = b"\r\n\r\n";

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Header lines as `(name, value)` pairs, in wire order.
    pub headers: Vec<(String, String)>,
    /// Parsed JSON body, `None` for header-only frames.
    pub body: Option<serde_json::Value>,
}

impl Frame {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Encode a JSON value into a wire-format message with a Content-Length header.
pub fn encode_message(value: &serde_json::Value) -> Vec<u8> {
    let body = value.to_string();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf
}

/// Decode one frame from the front of `data`.
///
/// Returns `Ok(None)` while the buffer does not yet hold a complete frame,
/// otherwise the frame and the number of bytes it occupied.
pub fn decode_message(data: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    let sep_pos = match data.windows(SEPARATOR.len()).position(|w| w == SEPARATOR) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let header_part = std::str::from_utf8(&data[..sep_pos])
        .map_err(|e| ProtocolError::Framing(format!("header is not UTF-8: {e}")))?;
    let headers = parse_headers(header_part);
    let content_length = content_length(&headers)?;

    let body_start = sep_pos + SEPARATOR.len();
    let total = body_start + content_length;
    if data.len() < total {
        return Ok(None);
    }

    let body = if content_length == 0 {
        None
    } else {
        Some(serde_json::from_slice(&data[body_start..total])?)
    };

    Ok(Some((Frame { headers, body }, total)))
}

fn parse_headers(header: &str) -> Vec<(String, String)> {
    header
        .split("\r\n")
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn content_length(headers: &[(String, String)]) -> Result<usize, ProtocolError> {
    let (_, value) = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .ok_or_else(|| ProtocolError::Framing("missing Content-Length header".into()))?;
    value.parse::<usize>().map_err(|e| {
        ProtocolError::Framing(format!("invalid Content-Length value '{value}': {e}"))
    })
}
