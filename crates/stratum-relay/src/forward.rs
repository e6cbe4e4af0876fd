use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::inspect::{intercept_line, MessageInspector, SessionContext};

/// Longest line accepted from either peer, excluding the newline.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// How long a forwarder waits for its destination to accept a shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Direction of line flow within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Miner -> pool, rewritten.
    ClientToUpstream,
    /// Pool -> miner, passed through.
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => f.write_str("client->upstream"),
            Direction::UpstreamToClient => f.write_str("upstream->client"),
        }
    }
}

/// Why a forwarder stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source closed its side.
    Eof,
    /// The session was shut down from the other direction.
    Shutdown,
}

/// Relay lines from `reader` to `writer` until EOF, an error, or `shutdown`,
/// then shut `writer` down.
///
/// Lines are framed on `\n` as raw bytes. With an inspector, a line that is
/// valid UTF-8 is passed through [`intercept_line`]; everything else is
/// written back byte for byte, including a trailing `\r` and non-UTF-8
/// content. Each line is written followed by a single `\n` and flushed before
/// the next line is read.
pub(crate) async fn forward_lines<R, W>(
    reader: R,
    mut writer: W,
    inspector: Option<Arc<dyn MessageInspector>>,
    ctx: Arc<SessionContext>,
    direction: Direction,
    max_line_length: usize,
    shutdown: CancellationToken,
) -> Result<StopReason, RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = relay_lines(
        reader,
        &mut writer,
        inspector.as_deref(),
        &ctx,
        direction,
        max_line_length,
        &shutdown,
    )
    .await;

    match tokio::time::timeout(CLOSE_TIMEOUT, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::trace!(session_id = %ctx.session_id, %direction, %err, "destination shutdown failed");
        }
        Err(_) => {
            tracing::debug!(session_id = %ctx.session_id, %direction, "destination shutdown timed out");
        }
    }

    result
}

async fn relay_lines<R, W>(
    reader: R,
    writer: &mut W,
    inspector: Option<&dyn MessageInspector>,
    ctx: &SessionContext,
    direction: Direction,
    max_line_length: usize,
    shutdown: &CancellationToken,
) -> Result<StopReason, RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let codec = AnyDelimiterCodec::new_with_max_length(vec![b'\n'], vec![b'\n'], max_line_length);
    let mut lines = FramedRead::new(reader, codec);
    let mut frame = Vec::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(StopReason::Shutdown),
            next = lines.next() => next,
        };

        let line = match next {
            None => return Ok(StopReason::Eof),
            Some(Ok(line)) => line,
            Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                return Err(RelayError::LineTooLong {
                    limit: max_line_length,
                })
            }
            Some(Err(AnyDelimiterCodecError::Io(err))) => return Err(RelayError::Read(err)),
        };

        // Line bodies can hold authorize passwords; only the size is traced.
        tracing::trace!(session_id = %ctx.session_id, %direction, len = line.len(), "line received");

        let rewritten = match (inspector, std::str::from_utf8(&line)) {
            (Some(inspector), Ok(text)) => match intercept_line(text, inspector, ctx) {
                Cow::Owned(text) => Some(text),
                Cow::Borrowed(_) => None,
            },
            _ => None,
        };

        frame.clear();
        frame.extend_from_slice(rewritten.as_deref().map_or(&line[..], str::as_bytes));
        frame.push(b'\n');

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(StopReason::Shutdown),
            written = write_line(writer, &frame) => written.map_err(RelayError::Write)?,
        }
    }
}

async fn write_line<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use credential_rewrite::{CredentialRewriter, Credentials};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // -- helpers ----------------------------------------------------------

    fn ctx() -> Arc<SessionContext> {
        Arc::new(SessionContext::new(
            "127.0.0.1:40000".parse().unwrap(),
            "127.0.0.1:1177",
        ))
    }

    fn rewriter() -> Option<Arc<dyn MessageInspector>> {
        Some(Arc::new(CredentialRewriter::new(Credentials::new("bob", "x"))))
    }

    /// Feed `input` through a forwarder and return everything it wrote.
    async fn forward_bytes(
        input: &[u8],
        inspector: Option<Arc<dyn MessageInspector>>,
        max_line_length: usize,
    ) -> (Result<StopReason, RelayError>, Vec<u8>) {
        let (mut src_peer, src) = tokio::io::duplex(64 * 1024);
        let (dst, mut dst_peer) = tokio::io::duplex(64 * 1024);

        src_peer.write_all(input).await.unwrap();
        drop(src_peer);

        let result = forward_lines(
            src,
            dst,
            inspector,
            ctx(),
            Direction::ClientToUpstream,
            max_line_length,
            CancellationToken::new(),
        )
        .await;

        let mut written = Vec::new();
        dst_peer.read_to_end(&mut written).await.unwrap();
        (result, written)
    }

    async fn run_forwarder(
        input: &str,
        inspector: Option<Arc<dyn MessageInspector>>,
        max_line_length: usize,
    ) -> (Result<StopReason, RelayError>, String) {
        let (result, written) = forward_bytes(input.as_bytes(), inspector, max_line_length).await;
        (result, String::from_utf8(written).unwrap())
    }

    // -- passthrough --------------------------------------------------------

    #[tokio::test]
    async fn passthrough_preserves_lines_and_order() {
        let input = "{\"id\":1,\"result\":true}\nnot json\n\n{\"method\":\"mining.notify\"}\n";
        let (result, written) = run_forwarder(input, None, DEFAULT_MAX_LINE_LENGTH).await;

        assert_eq!(result.unwrap(), StopReason::Eof);
        assert_eq!(written, input);
    }

    #[tokio::test]
    async fn final_line_without_newline_is_terminated() {
        let (result, written) = run_forwarder("a\nb", None, DEFAULT_MAX_LINE_LENGTH).await;
        assert_eq!(result.unwrap(), StopReason::Eof);
        assert_eq!(written, "a\nb\n");
    }

    #[tokio::test]
    async fn passthrough_does_not_rewrite_authorize() {
        let input = "{\"method\":\"mining.authorize\",\"params\":[\"alice.rig1\",\"pw\"]}\n";
        let (_, written) = run_forwarder(input, None, DEFAULT_MAX_LINE_LENGTH).await;
        assert_eq!(written, input);
    }

    // -- rewriting ----------------------------------------------------------

    #[tokio::test]
    async fn rewriting_variant_substitutes_credentials() {
        let input = concat!(
            "{\"id\":1,\"method\":\"mining.subscribe\",\"params\":[\"agent/1.0\"]}\n",
            "{not valid json\n",
            "{\"id\":2,\"method\":\"mining.authorize\",\"params\":[\"alice.rig1\",\"pw\"]}\n",
            "{\"id\":3,\"method\":\"mining.ping\",\"params\":[\"alice.rig1\"]}\n",
        );
        let (result, written) = run_forwarder(input, rewriter(), DEFAULT_MAX_LINE_LENGTH).await;
        assert_eq!(result.unwrap(), StopReason::Eof);

        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 4);

        let subscribe: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(subscribe["params"], serde_json::json!(["bob.0"]));

        assert_eq!(lines[1], "{not valid json");

        let authorize: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(authorize["params"], serde_json::json!(["bob.rig1", "x"]));
        assert_eq!(authorize["id"], serde_json::json!(2));

        assert_eq!(
            lines[3],
            "{\"id\":3,\"method\":\"mining.ping\",\"params\":[\"alice.rig1\"]}"
        );
    }

    // -- termination ------------------------------------------------------

    #[tokio::test]
    async fn over_long_line_stops_the_forwarder() {
        let input = format!("short\n{}\nnever\n", "a".repeat(64));
        let (result, written) = run_forwarder(&input, None, 32).await;

        assert!(matches!(result, Err(RelayError::LineTooLong { limit: 32 })));
        assert_eq!(written, "short\n");
    }

    #[tokio::test]
    async fn carriage_returns_and_binary_lines_pass_through_unchanged() {
        let input: &[u8] = b"{\"id\":1,\"result\":true}\r\n\xff\xfe binary\n{\"id\":2,\"result\":true}\n";

        let (result, written) = forward_bytes(input, None, DEFAULT_MAX_LINE_LENGTH).await;
        assert_eq!(result.unwrap(), StopReason::Eof);
        assert_eq!(written, input);

        let (result, written) = forward_bytes(input, rewriter(), DEFAULT_MAX_LINE_LENGTH).await;
        assert_eq!(result.unwrap(), StopReason::Eof);
        assert_eq!(written, input);
    }

    #[tokio::test]
    async fn rewrites_authorize_after_a_non_utf8_line() {
        let input: &[u8] =
            b"\xc3\x28\n{\"id\":2,\"method\":\"mining.authorize\",\"params\":[\"alice.rig1\",\"pw\"]}\n";
        let (result, written) = forward_bytes(input, rewriter(), DEFAULT_MAX_LINE_LENGTH).await;
        assert_eq!(result.unwrap(), StopReason::Eof);

        let mut lines = written.split(|b| *b == b'\n');
        assert_eq!(lines.next().unwrap(), b"\xc3\x28");
        let authorize: serde_json::Value = serde_json::from_slice(lines.next().unwrap()).unwrap();
        assert_eq!(authorize["params"], serde_json::json!(["bob.rig1", "x"]));
    }

    #[tokio::test]
    async fn destination_is_shut_down_after_eof() {
        let (mut src_peer, src) = tokio::io::duplex(1024);
        let (mut dst, mut dst_peer) = tokio::io::duplex(1024);

        src_peer.write_all(b"last\n").await.unwrap();
        drop(src_peer);

        let result = forward_lines(
            src,
            &mut dst,
            None,
            ctx(),
            Direction::UpstreamToClient,
            DEFAULT_MAX_LINE_LENGTH,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result.unwrap(), StopReason::Eof);

        // `dst` is still alive, so EOF here comes from the shutdown.
        let mut written = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), dst_peer.read_to_end(&mut written))
            .await
            .expect("destination was not shut down")
            .unwrap();
        assert_eq!(written, b"last\n");
        drop(dst);
    }

    #[tokio::test]
    async fn write_failure_stops_the_forwarder() {
        let (mut src_peer, src) = tokio::io::duplex(1024);
        let (dst, dst_peer) = tokio::io::duplex(1024);
        drop(dst_peer);

        src_peer.write_all(b"hello\n").await.unwrap();

        let result = forward_lines(
            src,
            dst,
            None,
            ctx(),
            Direction::UpstreamToClient,
            DEFAULT_MAX_LINE_LENGTH,
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(RelayError::Write(_))));
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_blocked_read() {
        let (_src_peer, src) = tokio::io::duplex(1024);
        let (dst, mut dst_peer) = tokio::io::duplex(1024);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(forward_lines(
            src,
            dst,
            None,
            ctx(),
            Direction::UpstreamToClient,
            DEFAULT_MAX_LINE_LENGTH,
            shutdown.clone(),
        ));

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("forwarder did not observe shutdown")
            .unwrap();
        assert_eq!(result.unwrap(), StopReason::Shutdown);

        let mut written = Vec::new();
        dst_peer.read_to_end(&mut written).await.unwrap();
        assert!(written.is_empty());
    }
}
