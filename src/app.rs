use crate::cli::Args;
use crate::commands::{ChatState, CommandDispatcher};
use crate::core::error::ChatError;
use crate::display::{self, StreamRenderer};
use crate::input;
use is_terminal::IsTerminal;
use std::io::{self, Read};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Application {
    pub args: Args,
    pub state: ChatState,
    pub command_dispatcher: CommandDispatcher,
}

impl Application {
    pub fn new(args: Args, state: ChatState, command_dispatcher: CommandDispatcher) -> Self {
        Self {
            args,
            state,
            command_dispatcher,
        }
    }

    pub async fn run(&mut self) -> Result<(), ChatError> {
        if self.args.list_models {
            println!(
                "{}",
                display::format_models(
                    self.state.controller.catalog(),
                    self.state.controller.session().selected_model()
                )
            );
            return Ok(());
        }

        let interactive = io::stdin().is_terminal();
        if self.args.chat || (self.args.query.is_none() && interactive) {
            return self.handle_continuous_chat_mode().await;
        }

        let context = if !interactive {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| ChatError::Input(format!("Failed to read from stdin: {}", e)))?;
            Some(buffer)
        } else {
            None
        };

        let query = build_query(self.args.query.as_deref(), context)?;
        self.handle_prompt(&query).await
    }

    async fn handle_continuous_chat_mode(&mut self) -> Result<(), ChatError> {
        display::display_welcome(&self.state.controller);

        let mut editor = input::create_editor(
            self.command_dispatcher.get_command_names(),
            self.state.controller.catalog().names().to_vec(),
        )?;

        loop {
            let line = match input::read_input(&mut editor)? {
                Some(line) => line.trim().to_string(),
                None => break,
            };

            if line.is_empty() {
                continue;
            }

            if line.starts_with('/') {
                match self
                    .command_dispatcher
                    .execute_line(&line, &mut self.state)
                    .await
                {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => {}
                    Err(e) => display::display_error(&e.to_string()),
                }

                if let Some(helper) = editor.helper_mut() {
                    helper.set_models(self.state.controller.catalog().names().to_vec());
                }
                if !self.state.should_continue {
                    break;
                }
                continue;
            }

            if let Err(e) = self.handle_prompt(&line).await {
                display::display_error(&e.to_string());
            }
        }

        input::save_history(&mut editor)?;
        Ok(())
    }

    /// Streams one reply to stdout. Ctrl-C cancels the generation in flight.
    /// A failed generation is acknowledged before the error is returned.
    async fn handle_prompt(&mut self, text: &str) -> Result<(), ChatError> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let renderer = tokio::spawn(async move {
            let mut renderer = StreamRenderer::stdout();
            while let Some(event) = events_rx.recv().await {
                if let Err(e) = renderer.render(&event) {
                    debug!("render failed: {}", e);
                }
            }
            let _ = renderer.finish();
        });

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let result = self
            .state
            .controller
            .send_prompt(text, &events_tx, &cancel)
            .await;

        watcher.abort();
        drop(events_tx);
        let _ = renderer.await;

        match result {
            Ok(_) => Ok(()),
            Err(ChatError::Cancelled) => {
                display::display_cancelled();
                Ok(())
            }
            Err(e) => {
                if let Some(message) = self.state.controller.acknowledge() {
                    debug!("acknowledged failure: {}", message);
                }
                Err(e)
            }
        }
    }
}

/// Combines the positional query with piped stdin.
pub fn build_query(query: Option<&str>, piped: Option<String>) -> Result<String, ChatError> {
    let piped = piped.filter(|p| !p.trim().is_empty());
    match (query, piped) {
        (Some(q), Some(ctx)) => Ok(format!("<pipe>{}</pipe>\n\n{}", ctx, q)),
        (None, Some(ctx)) => Ok(format!("<pipe>{}</pipe>", ctx)),
        (Some(q), None) => Ok(q.to_string()),
        (None, None) => Err(ChatError::Input(
            "No query provided (pass a prompt, pipe input, or use --chat)".to_string(),
        )),
    }
}
