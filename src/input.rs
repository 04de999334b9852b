use crate::config::Config;
use crate::core::error::ChatError;
use crate::session::PerformanceMode;

use console::style;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::history::FileHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config as EditorConfig, Context, EditMode, Editor, Helper};
use std::borrow::Cow;

/// Completes slash commands, model names after `/model` and modes after `/mode`.
pub struct ChatHelper {
    commands: Vec<String>,
    models: Vec<String>,
    hinter: HistoryHinter,
}

impl ChatHelper {
    pub fn new(commands: Vec<String>, models: Vec<String>) -> Self {
        Self {
            commands,
            models,
            hinter: HistoryHinter::new(),
        }
    }

    pub fn set_models(&mut self, models: Vec<String>) {
        self.models = models;
    }
}

/// Returns the replacement start and the candidates for `line[..pos]`.
pub fn complete_line(
    line: &str,
    pos: usize,
    commands: &[String],
    models: &[String],
) -> (usize, Vec<String>) {
    let Some(head) = line.get(..pos) else {
        return (pos, Vec::new());
    };
    let Some(rest) = head.strip_prefix('/') else {
        return (pos, Vec::new());
    };

    match rest.split_once(' ') {
        None => (
            1,
            commands
                .iter()
                .filter(|c| c.starts_with(rest))
                .cloned()
                .collect(),
        ),
        Some((command, arg)) if !arg.contains(' ') => {
            let start = pos - arg.len();
            let candidates: Vec<String> = match command {
                "model" => models.to_vec(),
                "mode" => PerformanceMode::ALL
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
                "set" => ["temperature", "max_tokens", "threads"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                "models" => vec!["refresh".to_string()],
                _ => Vec::new(),
            };
            (
                start,
                candidates
                    .into_iter()
                    .filter(|c| c.starts_with(arg))
                    .collect(),
            )
        }
        Some(_) => (pos, Vec::new()),
    }
}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, candidates) = complete_line(line, pos, &self.commands, &self.models);
        let pairs = candidates
            .into_iter()
            .map(|c| Pair {
                display: c.clone(),
                replacement: c,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for ChatHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(style(hint).dim().to_string())
    }
}

impl Validator for ChatHelper {}

impl Helper for ChatHelper {}

pub type ChatEditor = Editor<ChatHelper, FileHistory>;

pub fn create_editor(commands: Vec<String>, models: Vec<String>) -> Result<ChatEditor, ChatError> {
    let config = EditorConfig::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let mut editor = Editor::with_config(config)
        .map_err(|e| ChatError::Input(format!("Failed to create line editor: {}", e)))?;
    editor.set_helper(Some(ChatHelper::new(commands, models)));

    // First run has no history file yet.
    let _ = editor.load_history(&Config::input_history_path());

    Ok(editor)
}

/// Reads one line. `None` means the user asked to leave (Ctrl-C or Ctrl-D at the prompt).
pub fn read_input(editor: &mut ChatEditor) -> Result<Option<String>, ChatError> {
    let prompt = style("> ").bold().cyan().to_string();
    match editor.readline(&prompt) {
        Ok(line) => {
            if !line.trim().is_empty() {
                editor
                    .add_history_entry(line.as_str())
                    .map_err(|e| ChatError::Input(format!("Failed to add history entry: {}", e)))?;
            }
            Ok(Some(line))
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
            println!("Exiting...");
            Ok(None)
        }
        Err(err) => Err(ChatError::Input(format!("Input error: {}", err))),
    }
}

pub fn save_history(editor: &mut ChatEditor) -> Result<(), ChatError> {
    let history_path = Config::input_history_path();
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    editor
        .save_history(&history_path)
        .map_err(|e| ChatError::Input(format!("Failed to save history: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn completes_command_names() {
        let commands = names(&["mode", "model", "models", "quit"]);
        let (start, found) = complete_line("/mod", 4, &commands, &[]);
        assert_eq!(start, 1);
        assert_eq!(found, names(&["mode", "model", "models"]));
    }

    #[test]
    fn completes_model_argument() {
        let models = names(&["llama3", "taide-8b"]);
        let (start, found) = complete_line("/model ta", 9, &[], &models);
        assert_eq!(start, 7);
        assert_eq!(found, names(&["taide-8b"]));
    }

    #[test]
    fn completes_mode_argument() {
        let (start, found) = complete_line("/mode q", 7, &[], &[]);
        assert_eq!(start, 6);
        assert_eq!(found, names(&["quality"]));
    }

    #[test]
    fn plain_text_has_no_candidates() {
        let (_, found) = complete_line("hello", 5, &names(&["help"]), &[]);
        assert!(found.is_empty());
    }
}
