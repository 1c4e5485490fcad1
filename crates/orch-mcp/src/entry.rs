#![forbid(unsafe_code)]
//! Byte-stream framing for the stdio transport. Each incoming message is
//! either one JSON object per line or an LSP-style `Content-Length` frame;
//! the framing is detected per message and mirrored in the response.

use crate::jsonrpc::handle_payload;
use crate::service::Service;
use serde_json::Value;
use std::io::{BufRead, Write};

const MAX_CONTENT_LENGTH_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportMode {
    NewlineJson,
    ContentLength,
}

pub fn detect_mode_from_first_line(line: &str) -> Option<TransportMode> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(TransportMode::NewlineJson);
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("content-length:") || lower.starts_with("content-type:") {
        return Some(TransportMode::ContentLength);
    }
    None
}

pub fn parse_content_length_header(line: &str) -> Option<usize> {
    let trimmed = line.trim();
    let (key, value) = trimmed.split_once(':')?;
    if !key.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    value.trim().parse::<usize>().ok()
}

/// Read one `Content-Length` frame; `first_header` carries the header line
/// that triggered mode detection.
pub fn read_content_length_frame<R: BufRead>(
    reader: &mut R,
    mut first_header: Option<String>,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut header = String::new();
    if let Some(seed) = first_header.take() {
        header = seed;
    } else {
        let read = reader.read_line(&mut header)?;
        if read == 0 {
            return Ok(None);
        }
    }

    let mut content_length: Option<usize> = parse_content_length_header(&header);

    loop {
        let trimmed = header.trim_end();
        if trimmed.is_empty() {
            break;
        }

        header.clear();
        let read = reader.read_line(&mut header)?;
        if read == 0 {
            return Ok(None);
        }

        if content_length.is_none() {
            content_length = parse_content_length_header(&header);
        }
    }

    let Some(len) = content_length else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        ));
    };
    if len > MAX_CONTENT_LENGTH_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Content-Length exceeds max allowed size",
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

pub fn write_newline_json<W: Write>(writer: &mut W, response: &Value) -> std::io::Result<()> {
    writeln!(
        writer,
        "{}",
        serde_json::to_string(response).unwrap_or_else(|_| "{}".to_string())
    )?;
    writer.flush()
}

pub fn write_content_length_json<W: Write>(
    writer: &mut W,
    response: &Value,
) -> std::io::Result<()> {
    let body = serde_json::to_vec(response).unwrap_or_else(|_| b"{}".to_vec());
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(&body)?;
    writer.flush()
}

/// Serve the byte stream until EOF.
pub fn serve<R: BufRead, W: Write>(
    service: &mut Service,
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<()> {
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            return Ok(());
        }

        let Some(mode) = detect_mode_from_first_line(&line) else {
            continue;
        };

        let payload = match mode {
            TransportMode::NewlineJson => line.trim().as_bytes().to_vec(),
            TransportMode::ContentLength => {
                match read_content_length_frame(reader, Some(line))? {
                    Some(payload) => payload,
                    None => return Ok(()),
                }
            }
        };

        let Some(response) = handle_payload(service, &payload) else {
            continue;
        };
        match mode {
            TransportMode::NewlineJson => write_newline_json(writer, &response)?,
            TransportMode::ContentLength => write_content_length_json(writer, &response)?,
        }
    }
}
