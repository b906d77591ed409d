// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `Content-Length:`-prefixed JSON-RPC framing over a child process's stdio.
//!
//! Grounded on `sven-mcp`'s stdio-transport server wrapper (spawn a child,
//! speak line-delimited JSON-RPC) but generalized to the LSP wire format,
//! which prefixes each message with an HTTP-style header block instead of a
//! bare newline:
//!
//! ```text
//! Content-Length: 123\r\n
//! \r\n
//! {"jsonrpc":"2.0",...}
//! ```

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{LspError, Result};

/// Write one framed JSON-RPC message to `writer`.
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, value: &Value) -> Result<()> {
    let body = serde_json::to_vec(value).map_err(|e| LspError::Protocol(e.to_string()))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed JSON-RPC message from `reader`, or `Ok(None)` on clean EOF.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<Option<Value>> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None); // EOF before a full header was read
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break; // blank line ends the header block
        }
        if let Some(rest) = trimmed
            .to_ascii_lowercase()
            .strip_prefix("content-length:")
            .map(|_| trimmed.split_once(':').unwrap().1.trim())
        {
            content_length = Some(
                rest.parse()
                    .map_err(|_| LspError::Protocol(format!("bad Content-Length: {rest}")))?,
            );
        }
        // Other headers (e.g. Content-Type) are accepted and ignored.
    }

    let len = content_length
        .ok_or_else(|| LspError::Protocol("missing Content-Length header".into()))?;
    let mut buf = vec![0u8; len];
    tokio::io::AsyncReadExt::read_exact(reader, &mut buf).await?;
    let value: Value =
        serde_json::from_slice(&buf).map_err(|e| LspError::Protocol(e.to_string()))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn round_trips_a_message() {
        let mut buf: Vec<u8> = Vec::new();
        let msg = json!({"jsonrpc":"2.0","id":1,"method":"initialize"});
        write_message(&mut buf, &msg).await.unwrap();

        let mut reader = BufReader::new(&buf[..]);
        let read_back = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(read_back, msg);
    }

    #[tokio::test]
    async fn reads_multiple_messages_back_to_back() {
        let mut buf: Vec<u8> = Vec::new();
        write_message(&mut buf, &json!({"id": 1})).await.unwrap();
        write_message(&mut buf, &json!({"id": 2})).await.unwrap();

        let mut reader = BufReader::new(&buf[..]);
        let first = read_message(&mut reader).await.unwrap().unwrap();
        let second = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
    }

    #[tokio::test]
    async fn ignores_unknown_headers() {
        let body = b"{\"id\":7}";
        let mut raw = Vec::new();
        raw.extend_from_slice(
            format!("Content-Type: application/vscode-jsonrpc\r\nContent-Length: {}\r\n\r\n", body.len())
                .as_bytes(),
        );
        raw.extend_from_slice(body);

        let mut reader = BufReader::new(&raw[..]);
        let value = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(value["id"], 7);
    }

    #[tokio::test]
    async fn clean_eof_before_header_returns_none() {
        let mut reader = BufReader::new(&b""[..]);
        let value = read_message(&mut reader).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn missing_content_length_is_a_protocol_error() {
        let raw = b"Content-Type: foo\r\n\r\n{}";
        let mut reader = BufReader::new(&raw[..]);
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, LspError::Protocol(_)));
    }
}
