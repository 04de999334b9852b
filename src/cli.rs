use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat with a remote Ollama server from the terminal", long_about = None)]
pub struct Args {
    /// Prompt to send; piped stdin is prepended as <pipe>...</pipe>
    pub query: Option<String>,

    /// Start an interactive chat session
    #[arg(short, long)]
    pub chat: bool,

    /// Model to use (must be offered by the server)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Performance mode [possible values: balanced, speed, quality]
    #[arg(long)]
    pub mode: Option<String>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate (100 - 8192)
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Inference thread count (1 - 16)
    #[arg(long)]
    pub threads: Option<u32>,

    /// Server URL, overriding OLLAMA_API_BASE_URL and the config file
    #[arg(long)]
    pub base_url: Option<String>,

    /// Fall back to http://localhost:11434 when no URL is configured
    #[arg(long)]
    pub local: bool,

    /// Print the models offered by the server and exit
    #[arg(long)]
    pub list_models: bool,

    /// Directory for saved conversation transcripts
    #[arg(long)]
    pub history_dir: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}
