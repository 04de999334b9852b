//! In-memory conversation state: selected model, sampling options, history and
//! the server's continuation context. No I/O happens here.

pub mod message;
pub mod options;

pub use message::{ChatMessage, Role};
pub use options::{GenerationOptions, OptionField, OptionSetting, PerformanceMode};

use crate::core::error::ChatError;
use std::collections::HashMap;
use tracing::debug;

/// Opaque token sequence returned by the server to continue a conversation.
pub type ContinuationContext = Vec<i64>;

#[derive(Debug, Clone)]
pub struct SessionState {
    selected_model: String,
    options: GenerationOptions,
    history: Vec<ChatMessage>,
    context: ContinuationContext,
    mode: PerformanceMode,
    // Values the user set explicitly, remembered per mode.
    customized: HashMap<(PerformanceMode, OptionField), OptionSetting>,
}

impl SessionState {
    pub fn new(model: impl Into<String>, mode: PerformanceMode) -> Self {
        Self {
            selected_model: model.into(),
            options: GenerationOptions::for_mode(mode),
            history: Vec::new(),
            context: Vec::new(),
            mode,
            customized: HashMap::new(),
        }
    }

    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn context(&self) -> &[i64] {
        &self.context
    }

    pub fn performance_mode(&self) -> PerformanceMode {
        self.mode
    }

    pub fn append_user_turn(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::user(text));
    }

    pub fn append_assistant_turn(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::assistant(text));
    }

    pub fn set_context(&mut self, context: ContinuationContext) {
        self.context = context;
    }

    /// Switches the model and drops the continuation context.
    ///
    /// Returns `false` (and keeps the context) when `name` is already selected.
    pub fn select_model(&mut self, name: &str) -> Result<bool, ChatError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::Validation("model name must not be empty".to_string()));
        }
        if name == self.selected_model {
            return Ok(false);
        }
        debug!(from = %self.selected_model, to = %name, "switching model");
        self.selected_model = name.to_string();
        self.context.clear();
        Ok(true)
    }

    /// Applies the mode's preset, overlaid with anything the user customized
    /// while that mode was active.
    pub fn set_performance_mode(&mut self, mode: PerformanceMode) {
        self.mode = mode;
        let mut options = GenerationOptions::for_mode(mode);
        for field in OptionField::ALL {
            if let Some(setting) = self.customized.get(&(mode, field)) {
                options.apply(*setting);
            }
        }
        self.options = options;
    }

    pub fn set_option(&mut self, setting: OptionSetting) -> Result<(), ChatError> {
        setting.validate()?;
        self.options.apply(setting);
        self.customized.insert((self.mode, setting.field()), setting);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.context.clear();
    }
}
