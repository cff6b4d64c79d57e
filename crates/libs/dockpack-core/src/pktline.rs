//! Git pkt-line framing (C1).
//!
//! A pkt-line is a 4-byte lowercase-hex length prefix (the length of the
//! whole line, prefix included) followed by the payload. This module is
//! used exclusively to carry refusal/error messages to the Git client
//! before a `receive-pack`/`upload-pack` session ever starts, so the
//! payload is plain text and callers add their own trailing newline.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;

/// Frame `line` as a single pkt-line and write it to `writer`.
///
/// The length prefix covers the 4 header bytes themselves, matching Git's
/// wire format: `len(payload) + 4`.
pub async fn write_pkt_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    let payload = line.as_bytes();
    let header = format!("{:04x}", payload.len() + 4);
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Decode a single pkt-line back into its payload. Used only by the
/// round-trip property test; the real client-side decoder is Git itself.
pub fn decode_pkt_line(framed: &[u8]) -> Option<&[u8]> {
    if framed.len() < 4 {
        return None;
    }
    let len = usize::from_str_radix(std::str::from_utf8(&framed[..4]).ok()?, 16).ok()?;
    if len < 4 || framed.len() < len {
        return None;
    }
    Some(&framed[4..len])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_short_message() {
        let mut buf = Vec::new();
        write_pkt_line(&mut buf, "repo is locked, try again later").await.unwrap();
        let decoded = decode_pkt_line(&buf).unwrap();
        assert_eq!(decoded, b"repo is locked, try again later");
    }

    #[tokio::test]
    async fn round_trips_an_empty_message() {
        let mut buf = Vec::new();
        write_pkt_line(&mut buf, "").await.unwrap();
        assert_eq!(&buf, b"0004");
        assert_eq!(decode_pkt_line(&buf).unwrap(), b"");
    }

    #[tokio::test]
    async fn length_prefix_counts_its_own_four_bytes() {
        let mut buf = Vec::new();
        write_pkt_line(&mut buf, "ab").await.unwrap();
        // 2-byte payload + 4-byte header = 6 = 0x0006
        assert_eq!(&buf[..4], b"0006");
    }
}
