use crate::core::error::ChatError;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::time::Duration;

/// Re-frames a chunked body into newline-delimited lines.
///
/// Chunk boundaries may fall anywhere, including inside a multi-byte character.
/// A final unterminated line is yielded when the body ends. The first error ends
/// the stream.
pub fn split_lines<S, B>(chunks: S) -> impl Stream<Item = Result<String, ChatError>> + Send
where
    S: Stream<Item = Result<B, ChatError>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
{
    stream::unfold(
        (chunks, Vec::<u8>::new(), false),
        |(mut chunks, mut buf, mut eof)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buf.drain(..=pos).collect();
                    let line = decode_line(&raw[..pos]);
                    return Some((Ok(line), (chunks, buf, eof)));
                }
                if eof {
                    if buf.is_empty() {
                        return None;
                    }
                    let line = decode_line(&buf);
                    buf.clear();
                    return Some((Ok(line), (chunks, buf, eof)));
                }
                match chunks.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => {
                        buf.clear();
                        return Some((Err(e), (chunks, buf, true)));
                    }
                    None => eof = true,
                }
            }
        },
    )
}

fn decode_line(raw: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(raw);
    let line: &str = &decoded;
    line.strip_suffix('\r').unwrap_or(line).to_string()
}

/// Fails with [`ChatError::Timeout`] when no chunk arrives within `idle`.
pub fn with_idle_timeout<S, T>(inner: S, idle: Duration) -> BoxStream<'static, Result<T, ChatError>>
where
    S: Stream<Item = Result<T, ChatError>> + Send + 'static,
    T: Send + 'static,
{
    stream::unfold(Some(inner.boxed()), move |state| async move {
        let mut inner = state?;
        match tokio::time::timeout(idle, inner.next()).await {
            Ok(Some(item)) => Some((item, Some(inner))),
            Ok(None) => None,
            Err(_) => Some((
                Err(ChatError::Timeout(format!(
                    "no data received for {}s",
                    idle.as_secs_f32()
                ))),
                None,
            )),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(chunks: Vec<&'static str>) -> Vec<String> {
        let s = stream::iter(chunks.into_iter().map(|c| Ok::<_, ChatError>(c.as_bytes())));
        split_lines(s)
            .map(|r| r.unwrap())
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn joins_lines_split_across_chunks() {
        let lines = collect(vec!["{\"respo", "nse\":\"a\"}\n{\"response\"", ":\"b\"}\n"]).await;
        assert_eq!(lines, vec![r#"{"response":"a"}"#, r#"{"response":"b"}"#]);
    }

    #[tokio::test]
    async fn yields_unterminated_tail_and_strips_cr() {
        let lines = collect(vec!["one\r\ntwo"]).await;
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn multibyte_character_split_between_chunks() {
        let text = "你好\n";
        let bytes = text.as_bytes();
        let (a, b) = bytes.split_at(2);
        let s = stream::iter(vec![Ok::<_, ChatError>(a.to_vec()), Ok(b.to_vec())]);
        let lines: Vec<String> = split_lines(s).map(|r| r.unwrap()).collect().await;
        assert_eq!(lines, vec!["你好"]);
    }

    #[tokio::test]
    async fn error_ends_the_stream() {
        let s = stream::iter(vec![
            Ok::<_, ChatError>(b"partial".to_vec()),
            Err(ChatError::Connection("reset".into())),
            Ok(b"never\n".to_vec()),
        ]);
        let items: Vec<_> = split_lines(s).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ChatError::Connection(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_body_times_out() {
        let s = stream::iter(vec![Ok::<_, ChatError>(1u8)]).chain(stream::pending());
        let items: Vec<_> = with_idle_timeout(s, Duration::from_secs(30)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(1)));
        assert!(matches!(items[1], Err(ChatError::Timeout(_))));
    }
}
