use clap::Parser;
use ochat::app::Application;
use ochat::cli::Args;
use ochat::commands::{ChatState, create_command_registry};
use ochat::config::{BASE_URL_ENV, Config};
use ochat::controller::Controller;
use ochat::core::error::ChatError;
use ochat::display;
use ochat::session::{OptionSetting, PerformanceMode, SessionState};
use ochat::transport::OllamaClient;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "ochat=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_session(args: &Args, config: &Config) -> Result<SessionState, ChatError> {
    let mode = match args.mode.as_deref() {
        Some(mode) => mode.parse::<PerformanceMode>()?,
        None => config.performance_mode,
    };
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| config.default_model.clone());

    let mut session = SessionState::new(model, mode);
    if let Some(temperature) = args.temperature {
        session.set_option(OptionSetting::Temperature(temperature))?;
    }
    if let Some(max_tokens) = args.max_tokens {
        session.set_option(OptionSetting::MaxTokens(max_tokens))?;
    }
    if let Some(threads) = args.threads {
        session.set_option(OptionSetting::ThreadCount(threads))?;
    }
    Ok(session)
}

async fn run(args: Args) -> Result<(), ChatError> {
    let config = Config::load()?;
    let base_url = config.resolve_base_url(
        args.base_url.as_deref(),
        std::env::var(BASE_URL_ENV).ok(),
        args.local,
    )?;
    info!("using inference server {}", base_url);

    let session = build_session(&args, &config)?;
    let client = OllamaClient::new(base_url, config.transport.settings())?;
    let mut controller = Controller::new(Box::new(client), session)
        .with_coalesce_threshold(config.coalesce_threshold);
    controller.init().await;

    if let Some(requested) = args.model.as_deref()
        && controller.session().selected_model() != requested
    {
        display::display_error(&format!(
            "model '{}' is not available, using {}",
            requested,
            controller.session().selected_model()
        ));
    }

    let history_dir = args
        .history_dir
        .clone()
        .unwrap_or_else(|| config.history_dir());
    let state = ChatState::new(controller, history_dir);

    let mut app = Application::new(args, state, create_command_registry());
    app.run().await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        display::display_error(&e.to_string());
        std::process::exit(1);
    }
}
