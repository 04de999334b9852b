//! Orchestrates transport, stream decoding and session state into the
//! operations the presentation layer calls.
//!
//! ```text
//! Idle --init--> AwaitingModelList --(catalog | fallback)--> Ready
//! Ready --send_prompt--> Generating --complete|cancel--> Ready
//!                         Generating --failure--> Error --acknowledge--> Ready
//! ```

use crate::core::error::ChatError;
use crate::history;
use crate::session::{OptionSetting, PerformanceMode, SessionState};
use crate::stream::{DEFAULT_COALESCE_THRESHOLD, DecodedReply, StreamDecoder, StreamEvent, StreamHandle};
use crate::transport::{GenerateRequest, Transport};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Model used when discovery fails.
pub const SENTINEL_MODEL: &str = "taide-8b";

/// Models offered by the server. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    names: Vec<String>,
    fallback: bool,
}

impl ModelCatalog {
    pub fn sentinel() -> Self {
        Self {
            names: vec![SENTINEL_MODEL.to_string()],
            fallback: true,
        }
    }

    /// Deduplicates while keeping server order; an empty list yields the sentinel.
    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            let name = name.trim().to_string();
            if !name.is_empty() && !unique.contains(&name) {
                unique.push(name);
            }
        }
        if unique.is_empty() {
            return Self::sentinel();
        }
        Self {
            names: unique,
            fallback: false,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// True when discovery failed and only the sentinel is offered.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    fn first(&self) -> &str {
        &self.names[0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    AwaitingModelList,
    Ready,
    Generating,
    Error,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Idle => "idle",
            ControllerState::AwaitingModelList => "awaiting model list",
            ControllerState::Ready => "ready",
            ControllerState::Generating => "generating",
            ControllerState::Error => "error",
        };
        f.write_str(name)
    }
}

pub struct Controller {
    transport: Box<dyn Transport>,
    session: SessionState,
    catalog: ModelCatalog,
    state: ControllerState,
    last_error: Option<String>,
    coalesce_threshold: usize,
}

impl Controller {
    pub fn new(transport: Box<dyn Transport>, session: SessionState) -> Self {
        Self {
            transport,
            session,
            catalog: ModelCatalog::sentinel(),
            state: ControllerState::Idle,
            last_error: None,
            coalesce_threshold: DEFAULT_COALESCE_THRESHOLD,
        }
    }

    pub fn with_coalesce_threshold(mut self, threshold: usize) -> Self {
        self.coalesce_threshold = threshold.max(1);
        self
    }

    /// Builds the controller and runs model discovery.
    pub async fn connect(transport: Box<dyn Transport>, session: SessionState) -> Self {
        let mut controller = Self::new(transport, session);
        controller.init().await;
        controller
    }

    /// Fetches the catalog. Never fails: total failure leaves the sentinel catalog.
    pub async fn init(&mut self) {
        if self.state != ControllerState::Idle {
            debug!("init called in state {}, ignoring", self.state);
            return;
        }
        self.state = ControllerState::AwaitingModelList;
        self.load_catalog().await;
        self.state = ControllerState::Ready;
    }

    /// Explicit re-fetch of the catalog.
    pub async fn refresh_models(&mut self) -> Result<&ModelCatalog, ChatError> {
        self.require_ready("refresh models")?;
        self.state = ControllerState::AwaitingModelList;
        self.load_catalog().await;
        self.state = ControllerState::Ready;
        Ok(&self.catalog)
    }

    async fn load_catalog(&mut self) {
        self.catalog = match self.transport.list_models().await {
            Ok(names) => {
                let catalog = ModelCatalog::from_names(names);
                if catalog.is_fallback() {
                    warn!("server returned no models, using {}", SENTINEL_MODEL);
                }
                catalog
            }
            Err(e) => {
                warn!("model discovery failed, using {}: {}", SENTINEL_MODEL, e);
                ModelCatalog::sentinel()
            }
        };

        let selected = self.session.selected_model().to_string();
        if !self.catalog.contains(&selected) {
            let first = self.catalog.first().to_string();
            info!("model {} not offered by server, selecting {}", selected, first);
            // Names from the catalog are never empty.
            let _ = self.session.select_model(&first);
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Leaves `Error` for `Ready`, handing back the recorded failure message.
    pub fn acknowledge(&mut self) -> Option<String> {
        if self.state == ControllerState::Error {
            self.state = ControllerState::Ready;
        }
        self.last_error.take()
    }

    fn require_ready(&self, operation: &str) -> Result<(), ChatError> {
        if self.state == ControllerState::Ready {
            Ok(())
        } else {
            Err(ChatError::InvalidState(format!(
                "cannot {} while {}",
                operation, self.state
            )))
        }
    }

    pub fn select_model(&mut self, name: &str) -> Result<bool, ChatError> {
        self.require_ready("switch model")?;
        let name = name.trim();
        if name != SENTINEL_MODEL && !self.catalog.contains(name) {
            return Err(ChatError::Validation(format!("unknown model '{}'", name)));
        }
        let switched = self.session.select_model(name)?;
        if switched {
            info!("model switched to {}", name);
        }
        Ok(switched)
    }

    pub fn set_performance_mode(&mut self, mode: PerformanceMode) -> Result<(), ChatError> {
        self.require_ready("change performance mode")?;
        self.session.set_performance_mode(mode);
        Ok(())
    }

    pub fn set_option(&mut self, setting: OptionSetting) -> Result<(), ChatError> {
        self.require_ready("change options")?;
        self.session.set_option(setting)
    }

    pub fn clear(&mut self) -> Result<(), ChatError> {
        self.require_ready("clear the conversation")?;
        self.session.clear();
        Ok(())
    }

    /// Writes the conversation to a timestamped transcript in `dir`.
    pub fn persist_history(&self, dir: &Path) -> Result<PathBuf, ChatError> {
        history::save_transcript(dir, self.session.history())
    }

    /// Sends `text` and streams the reply.
    ///
    /// Render updates go to `events`; the final event is sent before the
    /// assistant turn is recorded. On failure the user turn stays in history,
    /// no assistant turn is added and the controller moves to `Error`. A
    /// cancelled generation returns [`ChatError::Cancelled`] and leaves the
    /// controller `Ready`, as does dropping the returned future mid-stream.
    pub async fn send_prompt(
        &mut self,
        text: &str,
        events: &UnboundedSender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        self.require_ready("send a prompt")?;
        if text.trim().is_empty() {
            return Err(ChatError::Input("prompt is empty".to_string()));
        }

        let Self {
            transport,
            session,
            state,
            last_error,
            coalesce_threshold,
            ..
        } = self;
        let generating = GeneratingGuard::enter(state);
        session.append_user_turn(text);

        let request = GenerateRequest::new(
            session.selected_model(),
            text,
            session.options(),
            session.context(),
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            opened = transport.generate(&request) => match opened {
                Ok(handle) => stream_reply(handle, *coalesce_threshold, events, cancel).await,
                Err(e) => Err(e),
            },
        };

        match outcome {
            Ok(reply) => {
                let _ = events.send(StreamEvent::Final(reply.text.clone()));
                if let Some(context) = reply.context {
                    session.set_context(context);
                }
                if !reply.text.is_empty() {
                    session.append_assistant_turn(reply.text.clone());
                }
                generating.finish(ControllerState::Ready);
                Ok(reply.text)
            }
            Err(ChatError::Cancelled) => {
                info!("generation cancelled, discarding partial reply");
                generating.finish(ControllerState::Ready);
                Err(ChatError::Cancelled)
            }
            Err(e) => {
                warn!("generation failed: {}", e);
                *last_error = Some(e.to_string());
                generating.finish(ControllerState::Error);
                Err(e)
            }
        }
    }
}

/// Holds the controller in `Generating` and puts it back to `Ready` if the
/// generation is dropped before it reports an outcome.
struct GeneratingGuard<'a> {
    state: &'a mut ControllerState,
}

impl<'a> GeneratingGuard<'a> {
    fn enter(state: &'a mut ControllerState) -> Self {
        *state = ControllerState::Generating;
        Self { state }
    }

    fn finish(self, next: ControllerState) {
        *self.state = next;
    }
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        if *self.state == ControllerState::Generating {
            debug!("generation abandoned, discarding partial reply");
            *self.state = ControllerState::Ready;
        }
    }
}

async fn stream_reply(
    mut handle: StreamHandle,
    coalesce_threshold: usize,
    events: &UnboundedSender<StreamEvent>,
    cancel: &CancellationToken,
) -> Result<DecodedReply, ChatError> {
    let mut decoder = StreamDecoder::new(coalesce_threshold);
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            line = handle.next_line() => line,
        };
        let Some(line) = line else { break };
        if let Some(event) = decoder.push_line(&line?)? {
            let _ = events.send(event);
        }
        if decoder.is_done() {
            break;
        }
    }
    if decoder.skipped_lines() > 0 {
        debug!("skipped {} malformed line(s)", decoder.skipped_lines());
    }
    Ok(decoder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    type Lines = Vec<Result<String, ChatError>>;

    #[derive(Default)]
    struct Scripted {
        catalog: Option<Vec<String>>,
        replies: Mutex<VecDeque<Result<(Lines, bool), ChatError>>>,
        requests: Arc<Mutex<Vec<GenerateRequest>>>,
    }

    impl Scripted {
        fn with_models(models: &[&str]) -> Self {
            Self {
                catalog: Some(models.iter().map(|m| m.to_string()).collect()),
                ..Default::default()
            }
        }

        fn reply(self, lines: &[&str]) -> Self {
            let lines = lines.iter().map(|l| Ok(l.to_string())).collect();
            self.replies.lock().unwrap().push_back(Ok((lines, false)));
            self
        }

        fn reply_then_hang(self, lines: &[&str]) -> Self {
            let lines = lines.iter().map(|l| Ok(l.to_string())).collect();
            self.replies.lock().unwrap().push_back(Ok((lines, true)));
            self
        }

        fn reply_lines(self, lines: Lines) -> Self {
            self.replies.lock().unwrap().push_back(Ok((lines, false)));
            self
        }

        fn fail(self, err: ChatError) -> Self {
            self.replies.lock().unwrap().push_back(Err(err));
            self
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn list_models(&self) -> Result<Vec<String>, ChatError> {
            self.catalog
                .clone()
                .ok_or_else(|| ChatError::Connection("refused".into()))
        }

        async fn generate(&self, request: &GenerateRequest) -> Result<StreamHandle, ChatError> {
            self.requests.lock().unwrap().push(request.clone());
            let (lines, hang) = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted reply")?;
            let body = stream::iter(lines);
            if hang {
                Ok(StreamHandle::new(body.chain(stream::pending())))
            } else {
                Ok(StreamHandle::new(body))
            }
        }
    }

    async fn ready(transport: Scripted) -> Controller {
        let session = SessionState::new(SENTINEL_MODEL, PerformanceMode::Balanced);
        Controller::connect(Box::new(transport), session).await
    }

    async fn send(controller: &mut Controller, text: &str) -> (Result<String, ChatError>, Vec<StreamEvent>) {
        let (tx, mut rx) = unbounded_channel();
        let result = controller
            .send_prompt(text, &tx, &CancellationToken::new())
            .await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    #[tokio::test]
    async fn init_loads_catalog_and_becomes_ready() {
        let controller = ready(Scripted::with_models(&["taide-8b", "llama3"])).await;
        assert_eq!(controller.state(), ControllerState::Ready);
        assert_eq!(controller.catalog().names(), &["taide-8b", "llama3"]);
        assert!(!controller.catalog().is_fallback());
    }

    #[tokio::test]
    async fn failed_discovery_falls_back_to_sentinel() {
        let controller = ready(Scripted::default()).await;
        assert_eq!(controller.state(), ControllerState::Ready);
        assert_eq!(controller.catalog().names(), &[SENTINEL_MODEL]);
        assert!(controller.catalog().is_fallback());
        assert_eq!(controller.session().selected_model(), SENTINEL_MODEL);
    }

    #[tokio::test]
    async fn unavailable_default_model_selects_first_offered() {
        let controller = ready(Scripted::with_models(&["mistral", "llama3"])).await;
        assert_eq!(controller.session().selected_model(), "mistral");
    }

    #[tokio::test]
    async fn send_prompt_records_both_turns_and_context() {
        let mut controller = ready(
            Scripted::with_models(&["taide-8b"]).reply(&[
                r#"{"response":"Hel"}"#,
                r#"{"response":"lo"}"#,
                r#"{"response":" world","done":true,"context":[4,5]}"#,
            ]),
        )
        .await;

        let (result, events) = send(&mut controller, "greet me").await;

        assert_eq!(result.unwrap(), "Hello world");
        assert_eq!(events.last(), Some(&StreamEvent::Final("Hello world".to_string())));
        let history = controller.session().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "greet me");
        assert_eq!(history[1].content, "Hello world");
        assert_eq!(controller.session().context(), &[4, 5]);
        assert_eq!(controller.state(), ControllerState::Ready);
    }

    #[tokio::test]
    async fn request_carries_model_options_and_context() {
        let transport = Scripted::with_models(&["taide-8b", "llama3"])
            .reply(&[r#"{"response":"a","done":true,"context":[9]}"#])
            .reply(&[r#"{"response":"b","done":true}"#]);
        let requests = transport.requests.clone();
        let mut controller = ready(transport).await;

        controller.set_option(OptionSetting::Temperature(1.1)).unwrap();
        send(&mut controller, "first").await.0.unwrap();
        send(&mut controller, "second").await.0.unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].context, Vec::<i64>::new());
        assert_eq!(requests[0].options.temperature, 1.1);
        assert_eq!(requests[1].context, vec![9]);
        assert_eq!(requests[1].prompt, "second");
        assert_eq!(requests[1].model, "taide-8b");
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_user_turn_only() {
        let mut controller = ready(Scripted::with_models(&["taide-8b"]).reply_lines(vec![
            Ok(r#"{"response":"partial answer"}"#.to_string()),
            Err(ChatError::Connection("connection reset".into())),
        ]))
        .await;

        let (result, events) = send(&mut controller, "question").await;

        assert!(matches!(result, Err(ChatError::Connection(_))));
        assert!(events.iter().all(|e| !e.is_final()));
        assert_eq!(controller.state(), ControllerState::Error);
        assert_eq!(controller.session().history().len(), 1);
        assert_eq!(controller.session().history()[0].content, "question");

        assert!(controller.acknowledge().is_some());
        assert_eq!(controller.state(), ControllerState::Ready);
    }

    #[tokio::test]
    async fn http_failure_is_reported_with_status() {
        let mut controller = ready(Scripted::with_models(&["taide-8b"]).fail(ChatError::Http {
            status: 404,
            body: "model not found".into(),
        }))
        .await;

        let (result, _) = send(&mut controller, "q").await;
        assert!(matches!(result, Err(ChatError::Http { status: 404, .. })));

        let (again, _) = send(&mut controller, "q2").await;
        assert!(matches!(again, Err(ChatError::InvalidState(_))));
        assert_eq!(controller.session().history().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_discards_partial_reply() {
        let long_line = format!(r#"{{"response":"{}"}}"#, "x".repeat(60));
        let mut controller =
            ready(Scripted::with_models(&["taide-8b"]).reply_then_hang(&[long_line.as_str()])).await;

        let (tx, mut rx) = unbounded_channel();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let watcher = tokio::spawn(async move {
            let first = rx.recv().await;
            trigger.cancel();
            first
        });

        let result = controller.send_prompt("long one", &tx, &cancel).await;

        assert!(matches!(result, Err(ChatError::Cancelled)));
        assert!(matches!(watcher.await.unwrap(), Some(StreamEvent::Incremental(_))));
        assert_eq!(controller.state(), ControllerState::Ready);
        assert_eq!(controller.session().history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_generation_returns_to_ready() {
        let mut controller = ready(
            Scripted::with_models(&["taide-8b"])
                .reply_then_hang(&[r#"{"response":"still thinking"}"#])
                .reply(&[r#"{"response":"ok","done":true}"#]),
        )
        .await;

        let (tx, _rx) = unbounded_channel();
        let cancel = CancellationToken::new();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            controller.send_prompt("slow", &tx, &cancel),
        )
        .await;
        assert!(abandoned.is_err());

        assert_eq!(controller.state(), ControllerState::Ready);
        assert_eq!(controller.session().history().len(), 1);
        assert!(controller.clear().is_ok());

        let (result, _) = send(&mut controller, "again").await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn select_model_enforces_catalog_and_clears_context() {
        let mut controller = ready(
            Scripted::with_models(&["taide-8b", "llama3"])
                .reply(&[r#"{"response":"a","done":true,"context":[1]}"#]),
        )
        .await;
        send(&mut controller, "hi").await.0.unwrap();
        assert_eq!(controller.session().context(), &[1]);

        assert!(matches!(
            controller.select_model("gpt-9"),
            Err(ChatError::Validation(_))
        ));
        assert_eq!(controller.session().context(), &[1]);

        assert!(controller.select_model("llama3").unwrap());
        assert!(controller.session().context().is_empty());
        assert_eq!(controller.session().history().len(), 2);
    }

    #[tokio::test]
    async fn empty_reply_is_not_recorded() {
        let mut controller = ready(
            Scripted::with_models(&["taide-8b"])
                .reply(&[r#"{"response":"","done":true,"context":[3]}"#]),
        )
        .await;
        let (result, _) = send(&mut controller, "hello?").await;
        assert_eq!(result.unwrap(), "");
        assert_eq!(controller.session().history().len(), 1);
        assert_eq!(controller.session().context(), &[3]);
    }

    #[tokio::test]
    async fn clear_and_mode_change_stay_ready() {
        let mut controller = ready(
            Scripted::with_models(&["taide-8b"]).reply(&[r#"{"response":"a","done":true,"context":[2]}"#]),
        )
        .await;
        send(&mut controller, "q").await.0.unwrap();

        controller.set_performance_mode(PerformanceMode::QualityFirst).unwrap();
        assert_eq!(controller.session().history().len(), 2);
        assert_eq!(controller.session().options().max_tokens, 8192);

        controller.clear().unwrap();
        assert!(controller.session().history().is_empty());
        assert!(controller.session().context().is_empty());
        assert_eq!(controller.state(), ControllerState::Ready);
    }

    #[tokio::test]
    async fn operations_before_init_are_rejected() {
        let session = SessionState::new(SENTINEL_MODEL, PerformanceMode::Balanced);
        let mut controller = Controller::new(Box::new(Scripted::default()), session);
        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(matches!(controller.clear(), Err(ChatError::InvalidState(_))));
        let (result, _) = send(&mut controller, "q").await;
        assert!(matches!(result, Err(ChatError::InvalidState(_))));
        assert!(controller.session().history().is_empty());
    }

    #[tokio::test]
    async fn persist_history_writes_transcript() {
        let mut controller = ready(
            Scripted::with_models(&["taide-8b"]).reply(&[r#"{"response":"pong","done":true}"#]),
        )
        .await;
        send(&mut controller, "ping").await.0.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = controller.persist_history(dir.path()).unwrap();
        let loaded = history::load_transcript(&path).unwrap();
        assert_eq!(loaded, controller.session().history());
    }
}
