pub mod dispatcher;
pub mod handler;
pub mod registry;

use crate::controller::Controller;
pub use dispatcher::{CommandDispatcher, create_command_registry};
use std::path::PathBuf;

/// State shared by the interactive loop and the slash commands.
pub struct ChatState {
    pub controller: Controller,
    pub history_dir: PathBuf,
    pub should_continue: bool,
}

impl ChatState {
    pub fn new(controller: Controller, history_dir: PathBuf) -> Self {
        Self {
            controller,
            history_dir,
            should_continue: true,
        }
    }
}
