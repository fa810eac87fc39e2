//! Promptgate - resilient command-line gateway to text-generation providers.

use std::io::{self, BufRead, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use promptgate::config::{available_models, ConfigLoader};
use promptgate::display;
use promptgate::gateway::{InvocationRequest, Orchestrator};
use promptgate::session::SessionStore;

#[derive(Parser)]
#[command(
    name = "promptgate",
    about = "Send a prompt to a configured text-generation provider",
    after_help = "Examples:\n  promptgate 'Hello Claude'\n  promptgate -m gpt4 -s project 'Continue our discussion'\n  echo 'Explain quantum physics' | promptgate -n 2000",
    version
)]
struct Cli {
    /// Model alias; selects the provider config file.
    #[arg(short, long, default_value = "claude4")]
    model: String,

    /// Session id for multi-turn context (empty disables sessions).
    #[arg(short, long, default_value = "")]
    session: String,

    /// Maximum tokens in the reply.
    #[arg(short = 'n', long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(1..))]
    max_tokens: u32,

    /// Overall timeout in seconds, covering all retries.
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    /// Number of attempts.
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    retries: u32,

    /// Do not print errors.
    #[arg(short, long)]
    quiet: bool,

    /// Print the outcome as JSON.
    #[arg(short, long)]
    json: bool,

    /// Read the provider config from this file instead of searching.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List configured models and saved sessions.
    #[arg(short, long)]
    list: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Prompt text; read from stdin when omitted.
    prompt: Vec<String>,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Positional words first, then piped stdin, then one interactive line.
fn read_prompt(words: &[String]) -> io::Result<String> {
    if !words.is_empty() {
        return Ok(words.join(" "));
    }

    let stdin = io::stdin();
    if !stdin.is_terminal() {
        let mut input = String::new();
        stdin.lock().read_to_string(&mut input)?;
        return Ok(input.trim().to_string());
    }

    eprint!("Prompt: ");
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn fail(message: &str, quiet: bool) -> ExitCode {
    if !quiet {
        display::print_error(message);
    }
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = SessionStore::default();

    if cli.list {
        let sessions = store.list().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to list sessions");
            Vec::new()
        });
        if let Err(e) = display::print_catalog(&available_models(&PathBuf::from(".")), &sessions)
        {
            return fail(&format!("Output: {e}"), cli.quiet);
        }
        return ExitCode::SUCCESS;
    }

    let loader = match cli.config.clone() {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::for_model(&cli.model),
    };
    let config = match loader.load() {
        Ok(config) => config,
        Err(e) => return fail(&format!("Config: {e}"), cli.quiet),
    };

    let prompt = match read_prompt(&cli.prompt) {
        Ok(prompt) if !prompt.is_empty() => prompt,
        _ => return fail("No input", cli.quiet),
    };

    let mut session = match store.open_async(&cli.model, &cli.session).await {
        Ok(session) => session,
        Err(e) => return fail(&format!("Session: {e}"), cli.quiet),
    };

    let cancel = CancellationToken::new();
    let orchestrator = match Orchestrator::from_config(config) {
        Ok(orchestrator) => orchestrator.with_cancellation(cancel.clone()),
        Err(e) => return fail(&e.to_string(), cli.quiet),
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling request");
            cancel.cancel();
        }
    });

    let request = InvocationRequest {
        model: cli.model.clone(),
        prompt,
        max_tokens: cli.max_tokens,
        timeout: Duration::from_secs(cli.timeout),
        attempts: cli.retries,
    };
    let outcome = orchestrator.invoke(&request, &mut session).await;
    drop(session);

    let mut stdout = io::stdout().lock();
    if cli.json {
        if let Err(e) = display::write_outcome_json(&mut stdout, &outcome) {
            return fail(&format!("Output: {e}"), cli.quiet);
        }
    } else if let Some(error) = outcome.error() {
        return fail(error, cli.quiet);
    } else if let Err(e) = display::write_response(&mut stdout, &outcome) {
        return fail(&format!("Output: {e}"), cli.quiet);
    }

    ExitCode::from(outcome.exit_code())
}
