use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use tokio::sync::mpsc;

use claif::client::ClaifClient;
use claif::core::config::{self, ResolvedConfig};
use claif::core::output::{self, OutputFormat};
use claif::core::session;
use claif::error::ClaifError;
use claif::providers::{Message, ProviderKind, QueryOptions, ResponseMetrics, StreamChunk};

#[derive(Parser)]
#[command(
    name = "claif",
    version,
    about = "One query surface over Claude, Gemini and Codex"
)]
struct Cli {
    /// Alternate config file (default: ~/.claif/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Per-query flags shared by the query-shaped subcommands.
#[derive(Args)]
struct QueryArgs {
    /// The prompt to send
    prompt: String,

    /// Model override (provider-specific)
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling temperature (0.0 - 1.0)
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Maximum tokens in the response
    #[arg(long)]
    max_tokens: Option<u32>,

    /// System prompt
    #[arg(short, long)]
    system: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl QueryArgs {
    fn to_options(&self) -> QueryOptions {
        QueryOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            system_prompt: self.system.clone(),
            timeout: self.timeout.map(std::time::Duration::from_secs),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Send a prompt to a provider and print the response
    Query {
        #[command(flatten)]
        args: QueryArgs,

        /// Provider to use (defaults to the configured provider)
        #[arg(short, long, value_enum)]
        provider: Option<ProviderKind>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Print response metrics after the answer
        #[arg(long)]
        show_metrics: bool,

        /// Save the transcript to session history
        #[arg(long)]
        save: bool,
    },

    /// Stream a response to stdout as chunks arrive
    Stream {
        #[command(flatten)]
        args: QueryArgs,

        /// Provider to use (defaults to the configured provider)
        #[arg(short, long, value_enum)]
        provider: Option<ProviderKind>,
    },

    /// Send a prompt to a randomly selected provider
    Random {
        #[command(flatten)]
        args: QueryArgs,

        /// Don't print which provider was selected
        #[arg(long)]
        no_show_provider: bool,
    },

    /// Send a prompt to every enabled provider concurrently
    Parallel {
        #[command(flatten)]
        args: QueryArgs,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// List configured providers
    Providers {
        /// Probe each provider with a 1-token query
        #[arg(long)]
        status: bool,
    },

    /// Inspect or edit the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Browse saved query transcripts
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration (API keys masked)
    Show,
    /// Set a config key, e.g. `claif config set general.default_provider gemini`
    Set { key: String, value: String },
    /// Print the config file path
    Path,
}

#[derive(Subcommand)]
enum SessionAction {
    /// List saved sessions
    List,
    /// Print a saved session
    Show {
        id: String,
        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Delete a saved session
    Delete { id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenv::dotenv().ok();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Stderr logger at warn (debug with --verbose); an extra debug log file
/// when CLAIF_LOG points somewhere.
fn init_logging(verbose: bool) {
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        log_config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Ok(path) = std::env::var("CLAIF_LOG")
        && let Ok(log_file) = File::create(path)
    {
        loggers.push(WriteLogger::new(LevelFilter::Debug, log_config, log_file));
    }
    let _ = CombinedLogger::init(loggers);
}

async fn run(cli: Cli) -> Result<(), ClaifError> {
    let file_config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Query {
            args,
            provider,
            format,
            show_metrics,
            save,
        } => {
            let resolved = config::resolve(&file_config, provider, format);
            run_query(&resolved, &args, show_metrics, save).await
        }
        Command::Stream { args, provider } => {
            let resolved = config::resolve(&file_config, provider, None);
            run_stream(&resolved, &args).await
        }
        Command::Random {
            args,
            no_show_provider,
        } => {
            let resolved = config::resolve(&file_config, None, None);
            run_random(&resolved, &args, !no_show_provider).await
        }
        Command::Parallel { args, format } => {
            let resolved = config::resolve(&file_config, None, format);
            run_parallel(&resolved, &args).await
        }
        Command::Providers { status } => {
            let resolved = config::resolve(&file_config, None, None);
            run_providers(&resolved, status).await
        }
        Command::Config { action } => run_config(file_config, cli.config.as_deref(), action),
        Command::Sessions { action } => run_sessions(action),
    }
}

async fn run_query(
    resolved: &ResolvedConfig,
    args: &QueryArgs,
    show_metrics: bool,
    save: bool,
) -> Result<(), ClaifError> {
    let client = ClaifClient::from_config(resolved);
    let kind = resolved.default_provider;
    let options = args.to_options();

    let start = Instant::now();
    let messages = client.query(kind, &args.prompt, &options).await?;

    println!("{}", output::format_messages(&messages, resolved.output_format));

    if show_metrics {
        let metrics = ResponseMetrics {
            duration: start.elapsed(),
            provider: kind,
            model: model_for(resolved, kind, &options),
        };
        println!("\n{}", output::format_metrics(&metrics));
    }

    if save || resolved.save_history {
        save_transcript(kind, &model_for(resolved, kind, &options), &args.prompt, &messages)?;
    }
    Ok(())
}

async fn run_stream(resolved: &ResolvedConfig, args: &QueryArgs) -> Result<(), ClaifError> {
    let client = ClaifClient::from_config(resolved);
    let kind = resolved.default_provider;
    let options = args.to_options();

    let (tx, mut rx) = mpsc::channel::<StreamChunk>(100);
    let printer = async {
        let mut stdout = std::io::stdout();
        while let Some(chunk) = rx.recv().await {
            if let StreamChunk::Content(text) = chunk {
                print!("{text}");
                let _ = stdout.flush();
            }
        }
    };

    let (result, ()) = tokio::join!(client.stream(kind, &args.prompt, &options, tx), printer);
    println!();
    result
}

async fn run_random(
    resolved: &ResolvedConfig,
    args: &QueryArgs,
    show_provider: bool,
) -> Result<(), ClaifError> {
    let client = ClaifClient::from_config(resolved);
    let options = args.to_options();

    let (kind, messages) = client.query_random(&args.prompt, &options).await?;
    if show_provider {
        println!("Selected provider: {kind}\n");
    }
    println!("{}", output::format_messages(&messages, resolved.output_format));

    if resolved.save_history {
        save_transcript(kind, &model_for(resolved, kind, &options), &args.prompt, &messages)?;
    }
    Ok(())
}

async fn run_parallel(resolved: &ResolvedConfig, args: &QueryArgs) -> Result<(), ClaifError> {
    let client = ClaifClient::from_config(resolved);
    let options = args.to_options();

    let results = client.query_all(&args.prompt, &options).await;
    for (kind, result) in results {
        println!("\n{kind}:");
        match result {
            Ok(messages) if !messages.is_empty() => {
                println!("{}", output::format_messages(&messages, resolved.output_format));
            }
            Ok(_) => println!("(no response)"),
            Err(e) => println!("error: {e}"),
        }
        println!("{}", "-".repeat(50));
    }
    Ok(())
}

async fn run_providers(resolved: &ResolvedConfig, status: bool) -> Result<(), ClaifError> {
    println!("Available providers:");
    for kind in ProviderKind::ALL {
        let settings = resolved.provider(kind);
        let state = if settings.enabled { "enabled" } else { "disabled" };
        let marker = if kind == resolved.default_provider {
            "  (default)"
        } else {
            ""
        };
        println!("  {kind:<8} {state:<9} {}{marker}", settings.model);
    }

    if status {
        let client = ClaifClient::from_config(resolved);
        println!("\nProvider health:");
        for (kind, healthy) in client.health_check().await {
            let state = if healthy { "ok" } else { "unreachable" };
            println!("  {kind:<8} {state}");
        }
    }
    Ok(())
}

fn run_config(
    mut file_config: config::ClaifConfig,
    config_path: Option<&std::path::Path>,
    action: ConfigAction,
) -> Result<(), ClaifError> {
    match action {
        ConfigAction::Show => {
            let resolved = config::resolve(&file_config, None, None);
            println!("General:");
            println!("  default_provider: {}", resolved.default_provider);
            println!("  output_format:    {:?}", resolved.output_format);
            println!("  save_history:     {}", resolved.save_history);
            println!(
                "  retry:            count={} delay={}ms backoff={}",
                resolved.retry.count,
                resolved.retry.initial_delay.as_millis(),
                resolved.retry.backoff,
            );
            for kind in ProviderKind::ALL {
                let settings = resolved.provider(kind);
                println!("\n{kind}:");
                println!("  enabled:  {}", settings.enabled);
                println!("  model:    {}", settings.model);
                println!("  base_url: {}", settings.base_url);
                println!("  api_key:  {}", config::mask_key(settings.api_key.as_deref()));
                println!("  timeout:  {}s", settings.timeout.as_secs());
            }
        }
        ConfigAction::Set { key, value } => {
            config::set_value(&mut file_config, &key, &value)?;
            let path = config::save_config(&file_config, config_path)?;
            println!("Set {key} ({})", path.display());
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(p) => p.to_path_buf(),
                None => config::config_path().ok_or_else(|| {
                    config::ConfigError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "no home directory",
                    ))
                })?,
            };
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn run_sessions(action: SessionAction) -> Result<(), ClaifError> {
    let dir = session::sessions_dir().map_err(ClaifError::Session)?;
    match action {
        SessionAction::List => {
            let index = session::load_index(&dir).map_err(ClaifError::Session)?;
            if index.sessions.is_empty() {
                println!("No saved sessions.");
                return Ok(());
            }
            for meta in index.sessions {
                let when = chrono::DateTime::from_timestamp(meta.updated_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!("{}  {}  {:<8} {}", meta.id, when, meta.provider, meta.title);
            }
        }
        SessionAction::Show { id, format } => {
            let data = session::load_session(&dir, &id).map_err(ClaifError::Session)?;
            println!("> {}\n", data.prompt);
            println!(
                "{}",
                output::format_messages(&data.messages, format.unwrap_or_default())
            );
        }
        SessionAction::Delete { id } => {
            session::delete_session(&dir, &id).map_err(ClaifError::Session)?;
            println!("Deleted session {id}");
        }
    }
    Ok(())
}

fn model_for(resolved: &ResolvedConfig, kind: ProviderKind, options: &QueryOptions) -> String {
    options
        .model
        .clone()
        .unwrap_or_else(|| resolved.provider(kind).model.clone())
}

fn save_transcript(
    kind: ProviderKind,
    model: &str,
    prompt: &str,
    messages: &[Message],
) -> Result<(), ClaifError> {
    let dir = session::sessions_dir().map_err(ClaifError::Session)?;
    if let Some(id) =
        session::record_query(&dir, kind, model, prompt, messages).map_err(ClaifError::Session)?
    {
        log::info!("Session saved: {id}");
    }
    Ok(())
}
