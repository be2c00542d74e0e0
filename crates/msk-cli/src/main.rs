use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod store;

#[derive(Parser)]
#[command(name = "msk")]
#[command(about = "Calendar transition resolver and dispatcher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Decode a calendar document and print its canonical encoding
    Check {
        /// Calendar JSON document
        file: String,

        /// Print the human-readable dump instead of the encoding
        #[arg(long, default_value_t = false)]
        diagnostic: bool,
    },

    /// Print the next (or previous) transitions of one calendar as JSON lines
    Resolve {
        /// Calendar JSON document (alternative to --config/--id)
        #[arg(required_unless_present = "id", conflicts_with = "id")]
        file: Option<String>,

        /// Layered config paths; the calendar store is read from calendars.dir
        #[arg(long = "config", requires = "id")]
        config_paths: Vec<String>,

        /// Calendar id in the configured store
        #[arg(long, requires = "config_paths")]
        id: Option<i64>,

        /// Query instant (RFC 3339)
        #[arg(long)]
        at: String,

        /// Number of transitions to print
        #[arg(long, default_value_t = 1)]
        count: usize,

        /// Walk backwards (at-or-before) instead of forwards
        #[arg(long, default_value_t = false)]
        backward: bool,

        /// Resolve on a targeted copy so results carry this owner
        #[arg(long)]
        target: Option<String>,
    },

    /// Build the registry and dispatcher from config and poll for transitions
    Run {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Registration instant (RFC 3339); defaults to the wall clock
        #[arg(long)]
        now: Option<String>,

        /// Run on a simulated clock from --now up to this instant, then exit
        #[arg(long)]
        until: Option<String>,

        /// Simulated clock step in seconds (with --until)
        #[arg(long, default_value_t = 60)]
        step_secs: u64,

        /// Fail instead of warn on config keys the run does not read
        #[arg(long, default_value_t = false)]
        strict_keys: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = msk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Check { file, diagnostic } => {
            commands::check::check(&file, diagnostic)?;
        }

        Commands::Resolve {
            file,
            config_paths,
            id,
            at,
            count,
            backward,
            target,
        } => {
            let source = match (file, id) {
                (Some(file), _) => commands::resolve::Source::File(file),
                (None, Some(id)) => commands::resolve::Source::Store { config_paths, id },
                (None, None) => anyhow::bail!("provide a calendar file or --config with --id"),
            };
            commands::resolve::resolve(commands::resolve::ResolveArgs {
                source,
                at: commands::parse_utc(&at, "--at")?,
                count,
                backward,
                target,
            })?;
        }

        Commands::Run {
            config_paths,
            now,
            until,
            step_secs,
            strict_keys,
        } => {
            commands::run::run(commands::run::RunArgs {
                config_paths,
                now: now.as_deref().map(|s| commands::parse_utc(s, "--now")).transpose()?,
                until: until
                    .as_deref()
                    .map(|s| commands::parse_utc(s, "--until"))
                    .transpose()?,
                step_secs,
                strict_keys,
            })
            .await?;
        }
    }

    Ok(())
}

/// Log to stderr: stdout carries only command output.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
