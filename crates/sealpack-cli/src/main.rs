//! Sealpack CLI - unseal, extract and repackage encrypted OCI packages

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

mod commands;
mod error;
mod exit_codes;
mod util;

#[derive(Parser)]
#[command(name = "sealpack")]
#[command(author = "Sealpack Contributors")]
#[command(version)]
#[command(about = "Unseal, extract and repackage encrypted OCI packages", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ~/.config/sealpack/config.yaml)
    #[arg(long, global = true, env = "SEALPACK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one package event through the pipeline
    Process {
        /// Event file (JSON)
        event: PathBuf,

        /// Directory receiving the repackaged archive
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Resolve a reference to a pinned tag
    Resolve {
        /// Package reference (e.g. ghcr.io/acme/pkg:^1.2)
        reference: String,
    },

    /// Show the contents of a repackaged archive
    Inspect {
        /// Archive path
        archive: PathBuf,

        /// Print package.yaml as-is
        #[arg(long)]
        raw: bool,
    },

    /// Generate the private key used to unseal events
    Keygen {
        /// RSA key size
        #[arg(long, default_value_t = 4096)]
        bits: u32,

        /// Write the public key to this file instead of stdout
        #[arg(long)]
        public_out: Option<PathBuf>,

        /// Overwrite an existing key
        #[arg(long)]
        force: bool,
    },

    /// Encrypt documents into a package file and matching event
    Seal {
        /// Public key (PEM) of the receiving side
        #[arg(short = 'k', long)]
        public_key: PathBuf,

        /// Package reference the event points at
        #[arg(short, long)]
        reference: String,

        /// Target image tag
        #[arg(short, long)]
        target: String,

        /// YAML files to seal
        #[arg(required = true)]
        documents: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let env_var = if std::env::var_os("SEALPACK_LOG").is_some() {
        "SEALPACK_LOG"
    } else {
        EnvFilter::DEFAULT_ENV
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var(env_var)
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn run(cli: Cli) -> error::Result<()> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Process { event, output_dir } => {
            let config = commands::load_config(config)?;
            commands::process::run(&event, &output_dir, config).await
        }

        Commands::Resolve { reference } => {
            let config = commands::load_config(config)?;
            commands::resolve::run(&reference, &config).await
        }

        Commands::Inspect { archive, raw } => commands::inspect::run(&archive, raw),

        Commands::Keygen {
            bits,
            public_out,
            force,
        } => {
            let config = commands::load_config(config)?;
            commands::keygen::run(&config, bits, public_out.as_deref(), force)
        }

        Commands::Seal {
            public_key,
            reference,
            target,
            documents,
            output_dir,
        } => commands::seal::run(&public_key, &reference, &target, &documents, &output_dir),
    }
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
