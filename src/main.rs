use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelroute::cli::CommandContext;
use modelroute::cli::commands::{self, generate::GenerateArgs};

#[derive(Parser)]
#[command(name = "modelroute")]
#[command(
    version,
    about = "Capability router with circuit-breaking transport and quality escalation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, help = "Config file to use instead of .modelroute/config.toml")]
    config: Option<PathBuf>,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a prompt and print the response
    Generate {
        #[arg(help = "Prompt text")]
        prompt: String,
        #[arg(long, short, help = "Task type used for routing (default: chat)")]
        task: Option<String>,
        #[arg(long = "context", value_name = "KEY=VALUE", help = "Extra request context")]
        context: Vec<String>,
        #[arg(long, help = "Maximum tokens to generate")]
        max_tokens: Option<u32>,
        #[arg(long, help = "Per-endpoint timeout in seconds")]
        timeout: Option<f64>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Ask for a suggestion for a task
    Suggest {
        #[arg(help = "Task type")]
        task: String,
        #[arg(help = "Prompt text")]
        prompt: String,
        #[arg(long = "context", value_name = "KEY=VALUE", help = "Extra request context")]
        context: Vec<String>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Show the endpoint order chosen for a task
    Route {
        #[arg(default_value = "chat", help = "Task type")]
        task: String,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Probe every configured endpoint
    Health {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text (toml), json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mmodelroute encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Default hook prints the backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded
fn run_cli() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.as_deref();

    let ok = match cli.command {
        Commands::Generate {
            prompt,
            task,
            context,
            max_tokens,
            timeout,
            format,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(async {
                let ctx = CommandContext::load(config_path)?;
                let args = GenerateArgs {
                    prompt,
                    task,
                    context,
                    max_tokens,
                    timeout_secs: timeout,
                    format,
                };
                ctx.run(commands::generate::run(&ctx, args)).await
            })?
        }
        Commands::Suggest {
            task,
            prompt,
            context,
            format,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(async {
                let ctx = CommandContext::load(config_path)?;
                ctx.run(commands::suggest::run(&ctx, &task, &prompt, &context, &format))
                    .await
            })?
        }
        Commands::Route { task, format } => {
            let ctx = CommandContext::load(config_path)?;
            commands::route::run(&ctx, &task, &format)?;
            true
        }
        Commands::Health { format } => {
            let rt = Runtime::new()?;
            rt.block_on(async {
                let ctx = CommandContext::load(config_path)?;
                ctx.run(commands::health::run(&ctx, &format)).await
            })?
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Show { format } => commands::config::show(config_path, &format)?,
                ConfigAction::Path => commands::config::path()?,
                ConfigAction::Init { global, force } => commands::config::init(global, force)?,
            }
            true
        }
    };

    Ok(ok)
}
