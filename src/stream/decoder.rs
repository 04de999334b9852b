use crate::core::error::ChatError;
use crate::transport::types::GenerateChunk;
use tracing::debug;

/// Minimum number of buffered characters before an incremental update is emitted.
pub const DEFAULT_COALESCE_THRESHOLD: usize = 50;

/// Appended to incremental updates to show that generation is still running.
pub const CURSOR_MARKER: char = '▌';

/// Render update emitted while a reply streams in. Both variants carry the full
/// text received so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Incremental(String),
    Final(String),
}

impl StreamEvent {
    pub fn text(&self) -> &str {
        match self {
            StreamEvent::Incremental(text) | StreamEvent::Final(text) => text,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, StreamEvent::Final(_))
    }

    /// Text as it should be drawn: incremental updates end in the cursor marker.
    pub fn rendered(&self) -> String {
        match self {
            StreamEvent::Incremental(text) => format!("{}{}", text, CURSOR_MARKER),
            StreamEvent::Final(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReply {
    pub text: String,
    /// Updated continuation context, if the server sent one.
    pub context: Option<Vec<i64>>,
}

/// Reduces newline-delimited JSON fragments into a running text buffer.
#[derive(Debug)]
pub struct StreamDecoder {
    full_text: String,
    pending_chars: usize,
    threshold: usize,
    context: Option<Vec<i64>>,
    done: bool,
    skipped: usize,
}

impl StreamDecoder {
    pub fn new(threshold: usize) -> Self {
        Self {
            full_text: String::new(),
            pending_chars: 0,
            threshold: threshold.max(1),
            context: None,
            done: false,
            skipped: 0,
        }
    }

    /// Feeds one raw line.
    ///
    /// Unparsable lines are skipped. An `error` object from the server aborts the
    /// stream.
    pub fn push_line(&mut self, line: &str) -> Result<Option<StreamEvent>, ChatError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let chunk: GenerateChunk = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.skipped += 1;
                debug!(error = %e, "skipping malformed stream line");
                return Ok(None);
            }
        };

        if let Some(message) = chunk.error {
            return Err(ChatError::Api(message));
        }

        self.full_text.push_str(&chunk.response);
        self.pending_chars += chunk.response.chars().count();

        if chunk.context.is_some() {
            self.context = chunk.context;
        }
        if chunk.done {
            self.done = true;
        }

        if self.pending_chars >= self.threshold {
            self.pending_chars = 0;
            return Ok(Some(StreamEvent::Incremental(self.full_text.clone())));
        }
        Ok(None)
    }

    /// True once the server sent `done: true`.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn text(&self) -> &str {
        &self.full_text
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    pub fn finish(self) -> DecodedReply {
        DecodedReply {
            text: self.full_text,
            context: self.context,
        }
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_COALESCE_THRESHOLD)
    }
}
