//! Wire format of the proxy rotation API
//!
//! Requests are a single HTTP/1.0 style request line with fixed headers.
//! Replies carry a colon separated body whose first field is a tag.

use crate::rotation::RotationError;
use crate::state::{LicenseInfo, OutboundIdentity};

/// Replies larger than this are never valid
pub const MAX_RESPONSE_BYTES: usize = 1000;

/// Commands understood by the rotation API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hello,
    Rotate,
}

impl Command {
    fn query(&self) -> &'static str {
        match self {
            Self::Hello => "cmd=hello&extended=1",
            Self::Rotate => "cmd=rotate&randomness=0&offset=0",
        }
    }
}

/// A parsed reply body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolReply {
    Hello(LicenseInfo),
    Rotate(OutboundIdentity),
    Error(String),
}

/// Builds the raw request for `command`
pub fn build_request(command: Command, host: &str, user_id: &str, password: &str) -> String {
    format!(
        "GET /api.php?api=1&uid={}&pwd={}&{} HTTP/1.0\r\n\
         Host: {}\r\n\
         Accept: text/html, text/plain, text/*, */*;q=0.01\r\n\
         Accept-Encoding: plain\r\n\
         Accept-Language: en\r\n\r\n",
        user_id,
        password,
        command.query(),
        host
    )
}

/// Returns the body of a raw response (everything after the first blank line)
pub fn extract_body(response: &str) -> &str {
    let crlf = response.find("\r\n\r\n").map(|pos| (pos, 4));
    let lf = response.find("\n\n").map(|pos| (pos, 2));

    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match split {
        Some((pos, len)) => &response[pos + len..],
        None => "",
    }
}

/// Parses a complete raw response into a reply
///
/// # Errors
///
/// `RotationError::InvalidResponse` for oversized responses, unknown tags,
/// missing or malformed fields.
pub fn parse_response(raw: &[u8]) -> Result<ProtocolReply, RotationError> {
    if raw.len() > MAX_RESPONSE_BYTES {
        return Err(RotationError::InvalidResponse(format!(
            "response of {} bytes exceeds {} bytes",
            raw.len(),
            MAX_RESPONSE_BYTES
        )));
    }

    let text = String::from_utf8_lossy(raw);
    let body = extract_body(&text).trim();
    let fields: Vec<&str> = body.split(':').map(str::trim).collect();

    match fields[0] {
        "ERROR" => Ok(ProtocolReply::Error(fields[1..].join(":"))),
        "HELLO" => {
            let &[_, max, total, protocol, processes, ..] = fields.as_slice() else {
                return Err(invalid_fields("HELLO", &fields));
            };
            let total_identities = parse_number("HELLO", total)?;
            Ok(ProtocolReply::Hello(LicenseInfo {
                max_identities: parse_number("HELLO", max)?,
                total_identities,
                protocol: protocol.to_string(),
                process_count: parse_number("HELLO", processes)?,
                active: total_identities > 0,
            }))
        }
        "ROTATE" => {
            let &[_, address, port, external, ..] = fields.as_slice() else {
                return Err(invalid_fields("ROTATE", &fields));
            };
            if address.is_empty() || external.is_empty() {
                return Err(invalid_fields("ROTATE", &fields));
            }
            Ok(ProtocolReply::Rotate(OutboundIdentity {
                address: address.to_string(),
                port: port.parse().map_err(|_| {
                    RotationError::InvalidResponse(format!("ROTATE: invalid port '{}'", port))
                })?,
                external_address: external.to_string(),
                ready: true,
            }))
        }
        other => Err(RotationError::InvalidResponse(format!(
            "unknown reply tag '{}'",
            other
        ))),
    }
}

fn parse_number(tag: &str, field: &str) -> Result<u32, RotationError> {
    field
        .parse()
        .map_err(|_| RotationError::InvalidResponse(format!("{}: invalid number '{}'", tag, field)))
}

fn invalid_fields(tag: &str, fields: &[&str]) -> RotationError {
    RotationError::InvalidResponse(format!(
        "{} reply with {} fields: '{}'",
        tag,
        fields.len(),
        fields.join(":")
    ))
}
