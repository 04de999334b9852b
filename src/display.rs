use crate::controller::{Controller, ModelCatalog};
use crate::session::{ChatMessage, Role, SessionState};
use crate::stream::{CURSOR_MARKER, StreamEvent};
use console::{Term, style};
use std::io;

/// Draws a streaming reply in place: each update appends the text received
/// since the previous one and moves the cursor marker to the end.
pub struct StreamRenderer {
    term: Term,
    printed: String,
    show_cursor: bool,
    cursor_visible: bool,
}

impl StreamRenderer {
    pub fn stdout() -> Self {
        let term = Term::stdout();
        let show_cursor = term.is_term();
        Self {
            term,
            printed: String::new(),
            show_cursor,
            cursor_visible: false,
        }
    }

    pub fn render(&mut self, event: &StreamEvent) -> io::Result<()> {
        self.hide_cursor()?;

        let text = event.text();
        let tail = pending_tail(&self.printed, text);
        if !text.starts_with(self.printed.as_str()) {
            self.term.write_line("")?;
        }
        self.term.write_str(tail)?;
        self.printed = text.to_string();

        if !event.is_final() && self.show_cursor {
            self.term.write_str(&CURSOR_MARKER.to_string())?;
            self.cursor_visible = true;
        }
        self.term.flush()?;

        if event.is_final() {
            self.finish()?;
        }
        Ok(())
    }

    /// Removes the cursor and terminates the reply line. Safe to call twice.
    pub fn finish(&mut self) -> io::Result<()> {
        self.hide_cursor()?;
        if !self.printed.is_empty() && !self.printed.ends_with('\n') {
            self.term.write_line("")?;
        }
        self.printed.clear();
        Ok(())
    }

    fn hide_cursor(&mut self) -> io::Result<()> {
        if self.cursor_visible {
            self.term.clear_chars(1)?;
            self.cursor_visible = false;
        }
        Ok(())
    }
}

/// The part of `text` not yet on screen. Updates carry the full reply so far,
/// so this is normally the suffix after `printed`; anything else is redrawn.
pub fn pending_tail<'a>(printed: &str, text: &'a str) -> &'a str {
    text.strip_prefix(printed).unwrap_or(text)
}

pub fn display_welcome(controller: &Controller) {
    println!(
        "{} {}",
        style("Connected.").bold().green(),
        style(format!(
            "Model: {}  Mode: {}",
            controller.session().selected_model(),
            controller.session().performance_mode()
        ))
        .dim()
    );
    if controller.catalog().is_fallback() {
        println!(
            "{}",
            style("Model list unavailable, using the default model.").yellow()
        );
    }
    println!(
        "Type '/help' for available commands. Press Ctrl+C to stop a reply, Ctrl+D or /quit to exit."
    );
}

pub fn display_error(message: &str) {
    eprintln!("{} {}", style("Error:").bold().red(), message);
}

pub fn display_cancelled() {
    println!("{}", style("Generation cancelled").bold().yellow());
}

pub fn format_options(session: &SessionState) -> String {
    let options = session.options();
    let mut lines = vec![
        style("Current settings").bold().underlined().to_string(),
        format!("  model:       {}", session.selected_model()),
        format!("  mode:        {}", session.performance_mode()),
        format!("  temperature: {}", options.temperature),
        format!("  max_tokens:  {}", options.max_tokens),
        format!("  threads:     {}", options.thread_count),
        format!("  context:     {}", options.context_window),
    ];
    if !session.context().is_empty() {
        lines.push(format!(
            "  continuation: {} tokens",
            session.context().len()
        ));
    }
    lines.join("\n")
}

pub fn format_models(catalog: &ModelCatalog, selected: &str) -> String {
    let mut lines = vec![style("Available models").bold().underlined().to_string()];
    for name in catalog.names() {
        if name == selected {
            lines.push(format!("* {}", style(name).bold().green()));
        } else {
            lines.push(format!("  {}", name));
        }
    }
    if catalog.is_fallback() {
        lines.push(style("(server model list unavailable)").dim().to_string());
    }
    lines.join("\n")
}

pub fn format_transcript(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return "No messages.".to_string();
    }
    messages
        .iter()
        .map(|message| {
            let label = match message.role {
                Role::User => style("You:").bold().cyan(),
                Role::Assistant => style("Assistant:").bold().magenta(),
            };
            format!("{} {}", label, message.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
