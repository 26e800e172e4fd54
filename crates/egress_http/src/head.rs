//! Response head rendering: status line plus header block.

use crate::headers::Headers;

const HTTP_VERSION: &str = "HTTP/1.1";
const CRLF: &str = "\r\n";

/// Render the status line and every header (multi-valued headers as
/// repeated lines) into the wire form, including the terminating blank line.
pub fn render_head(status: u16, headers: &Headers) -> Vec<u8> {
    let mut out = String::with_capacity(head_len_hint(status, headers));
    write_status_line(&mut out, status);
    for (name, values) in headers.iter() {
        for value in values {
            write_header(&mut out, name, value);
        }
    }
    out.push_str(CRLF);
    out.into_bytes()
}

/// Estimate the size of the head block to reduce reallocations.
fn head_len_hint(status: u16, headers: &Headers) -> usize {
    let mut len = HTTP_VERSION.len() + 1 + 3 + 1 + reason_phrase(status).len() + CRLF.len();
    for (name, values) in headers.iter() {
        for value in values {
            len += name.len() + 2 + value.len() + CRLF.len();
        }
    }
    len + CRLF.len()
}

/// Append an HTTP status line to the output buffer.
fn write_status_line(out: &mut String, status: u16) {
    out.push_str(HTTP_VERSION);
    out.push(' ');
    out.push_str(&status.to_string());
    out.push(' ');
    out.push_str(reason_phrase(status));
    out.push_str(CRLF);
}

/// Append a single header line to the output buffer.
fn write_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str(CRLF);
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}
