pub mod decoder;
pub mod lines;

pub use decoder::{CURSOR_MARKER, DEFAULT_COALESCE_THRESHOLD, DecodedReply, StreamDecoder, StreamEvent};

use crate::core::error::ChatError;
use futures::stream::{self, BoxStream, Stream, StreamExt};

/// An open generation response, exposed as a sequence of raw lines.
///
/// Dropping the handle closes the underlying connection.
pub struct StreamHandle {
    lines: BoxStream<'static, Result<String, ChatError>>,
}

impl StreamHandle {
    pub fn new(lines: impl Stream<Item = Result<String, ChatError>> + Send + 'static) -> Self {
        Self {
            lines: lines.boxed(),
        }
    }

    /// Frames a chunked body into lines.
    pub fn from_chunks<S, B>(chunks: S) -> Self
    where
        S: Stream<Item = Result<B, ChatError>> + Send + Unpin + 'static,
        B: AsRef<[u8]> + Send + 'static,
    {
        Self::new(lines::split_lines(chunks))
    }

    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(lines.into_iter().map(Ok)))
    }

    pub async fn next_line(&mut self) -> Option<Result<String, ChatError>> {
        self.lines.next().await
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}
