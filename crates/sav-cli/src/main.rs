use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod store;

#[derive(Parser)]
#[command(name = "savable")]
#[command(about = "Structural diff and patch-based editing of JSON documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the patch that turns BASELINE into CANDIDATE
    ///
    /// Removed keys print as null, like keys set to null.
    Diff {
        /// Baseline JSON document
        baseline: String,

        /// Candidate JSON document
        candidate: String,

        /// Also report keys present only in the candidate
        #[arg(long, default_value_t = false)]
        with_additions: bool,

        /// Print changed leaf pointers (one per line) instead of the patch
        #[arg(long, default_value_t = false)]
        pointers: bool,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Edit top-level fields of a JSON file and persist only what changed
    Edit {
        /// JSON document to edit in place
        file: String,

        /// Field assignment KEY=JSON (repeatable, applied in order)
        #[arg(long = "set", value_name = "KEY=JSON", required = true)]
        sets: Vec<String>,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Fail instead of warning when the config carries keys nothing reads
        #[arg(long, default_value_t = false)]
        strict_config: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Diff {
            baseline,
            candidate,
            with_additions,
            pointers,
        } => {
            init_tracing(None);
            commands::diff::run(&baseline, &candidate, with_additions, pointers)?;
        }

        Commands::ConfigHash { paths } => {
            init_tracing(None);
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = sav_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Edit {
            file,
            sets,
            config_paths,
            strict_config,
        } => {
            let loaded = commands::load_config(&config_paths)?;
            init_tracing(sav_config::log_filter_from_config_json(&loaded.config_json));
            commands::edit::run(&file, &sets, &loaded, strict_config).await?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins, then the config's `logging.filter`, then `info`.
/// Logs go to stderr; stdout carries command output only.
fn init_tracing(config_filter: Option<String>) {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| config_filter.and_then(|f| EnvFilter::try_new(f).ok()))
        .unwrap_or_else(|| "info".into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
