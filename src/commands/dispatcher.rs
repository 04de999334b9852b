use super::{
    ChatState,
    handler::{
        ClearCommand, HelpCommand, ListHistoryCommand, ModeCommand, ModelCommand, ModelsCommand,
        OptionsCommand, QuitCommand, SaveHistoryCommand, SetCommand, ShowHistoryCommand,
    },
    registry::CommandRegistry,
};
use crate::core::error::ChatError;
use std::sync::Arc;

#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    /// Runs a `/command arg...` line. `line` must start with `/`.
    pub async fn execute_line(
        &self,
        line: &str,
        state: &mut ChatState,
    ) -> Result<Option<String>, ChatError> {
        let parts: Vec<&str> = line.trim_start_matches('/').split_whitespace().collect();
        match parts.split_first() {
            Some((command, args)) => self.execute(command, args, state).await,
            None => Ok(None),
        }
    }

    pub async fn execute(
        &self,
        command: &str,
        args: &[&str],
        state: &mut ChatState,
    ) -> Result<Option<String>, ChatError> {
        self.registry.execute(command, args, state).await
    }

    pub fn get_command_names(&self) -> Vec<String> {
        self.registry.get_command_names()
    }
}

pub fn create_command_registry() -> CommandDispatcher {
    let mut registry = CommandRegistry::new();

    registry.register("quit", QuitCommand);
    registry.register("help", HelpCommand);
    registry.register("clear", ClearCommand);
    registry.register("model", ModelCommand);
    registry.register("models", ModelsCommand);
    registry.register("mode", ModeCommand);
    registry.register("set", SetCommand);
    registry.register("options", OptionsCommand);
    registry.register("save", SaveHistoryCommand);
    registry.register("list", ListHistoryCommand);
    registry.register("show", ShowHistoryCommand);

    CommandDispatcher::new(Arc::new(registry))
}
