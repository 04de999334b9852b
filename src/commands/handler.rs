use super::ChatState;
use crate::core::error::ChatError;
use crate::display;
use crate::history;
use crate::session::{OptionField, OptionSetting, PerformanceMode};
use async_trait::async_trait;
use console::style;
use std::path::PathBuf;

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, state: &mut ChatState, args: &[&str])
    -> Result<Option<String>, ChatError>;
    fn help(&self) -> &'static str;
}

pub struct QuitCommand;
pub struct HelpCommand;
pub struct ClearCommand;
pub struct ModelCommand;
pub struct ModelsCommand;
pub struct ModeCommand;
pub struct SetCommand;
pub struct OptionsCommand;
pub struct SaveHistoryCommand;
pub struct ListHistoryCommand;
pub struct ShowHistoryCommand;

#[async_trait]
impl CommandHandler for QuitCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        state.should_continue = false;
        Ok(None)
    }

    fn help(&self) -> &'static str {
        "/quit - Exit the chat session"
    }
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn execute(
        &self,
        _state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        let title = style("Available Commands").bold().underlined();
        let help_text = [
            title.to_string(),
            QuitCommand.help().to_string(),
            HelpCommand.help().to_string(),
            ClearCommand.help().to_string(),
            ModelCommand.help().to_string(),
            ModelsCommand.help().to_string(),
            ModeCommand.help().to_string(),
            SetCommand.help().to_string(),
            OptionsCommand.help().to_string(),
            SaveHistoryCommand.help().to_string(),
            ListHistoryCommand.help().to_string(),
            ShowHistoryCommand.help().to_string(),
        ]
        .join("\n");

        Ok(Some(help_text))
    }

    fn help(&self) -> &'static str {
        "/help - Show available commands"
    }
}

#[async_trait]
impl CommandHandler for ClearCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        state.controller.clear()?;
        Ok(Some("Chat history cleared.".to_string()))
    }

    fn help(&self) -> &'static str {
        "/clear - Clear conversation history and context"
    }
}

#[async_trait]
impl CommandHandler for ModelCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        let Some(name) = args.first() else {
            return Ok(Some(format!(
                "Current model: {}",
                state.controller.session().selected_model()
            )));
        };

        if state.controller.select_model(name)? {
            Ok(Some(format!(
                "Model changed to: {} (conversation context reset)",
                name
            )))
        } else {
            Ok(Some(format!("Already using {}", name)))
        }
    }

    fn help(&self) -> &'static str {
        "/model <name> - Show or change the current model"
    }
}

#[async_trait]
impl CommandHandler for ModelsCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        if args.first() == Some(&"refresh") {
            state.controller.refresh_models().await?;
        }
        Ok(Some(display::format_models(
            state.controller.catalog(),
            state.controller.session().selected_model(),
        )))
    }

    fn help(&self) -> &'static str {
        "/models [refresh] - List available models, optionally re-fetching them"
    }
}

#[async_trait]
impl CommandHandler for ModeCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        if let Some(mode) = args.first() {
            let mode: PerformanceMode = mode.parse()?;
            state.controller.set_performance_mode(mode)?;
        }
        Ok(Some(display::format_options(state.controller.session())))
    }

    fn help(&self) -> &'static str {
        "/mode <balanced|speed|quality> - Show or change the performance mode"
    }
}

#[async_trait]
impl CommandHandler for SetCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        let [field, value] = args else {
            return Ok(Some("Usage: /set <temperature|max_tokens|threads> <value>".to_string()));
        };

        let field: OptionField = field.parse()?;
        let setting = OptionSetting::parse(field, value)?;
        state.controller.set_option(setting)?;
        Ok(Some(format!("{} set to {}", field.name(), value.trim())))
    }

    fn help(&self) -> &'static str {
        "/set <temperature|max_tokens|threads> <value> - Adjust a generation option"
    }
}

#[async_trait]
impl CommandHandler for OptionsCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        Ok(Some(display::format_options(state.controller.session())))
    }

    fn help(&self) -> &'static str {
        "/options - Show the current model, mode and generation options"
    }
}

#[async_trait]
impl CommandHandler for SaveHistoryCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        let path = state.controller.persist_history(&state.history_dir)?;
        Ok(Some(format!("History saved to: {}", path.display())))
    }

    fn help(&self) -> &'static str {
        "/save - Save conversation history to a timestamped file"
    }
}

#[async_trait]
impl CommandHandler for ListHistoryCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        let files = history::list_transcripts(&state.history_dir)?;
        if files.is_empty() {
            return Ok(Some("No history files found.".to_string()));
        }
        let names: Vec<String> = files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        Ok(Some(names.join("\n")))
    }

    fn help(&self) -> &'static str {
        "/list - List saved conversation history files"
    }
}

#[async_trait]
impl CommandHandler for ShowHistoryCommand {
    async fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, ChatError> {
        let Some(name) = args.first() else {
            return Ok(Some(display::format_transcript(
                state.controller.session().history(),
            )));
        };

        let mut path = PathBuf::from(name);
        if !path.exists() {
            path = state.history_dir.join(name);
        }
        let messages = history::load_transcript(&path)?;
        Ok(Some(display::format_transcript(&messages)))
    }

    fn help(&self) -> &'static str {
        "/show [file] - Show the current conversation or a saved history file"
    }
}
