//! wgtun - WireGuard tunnel configuration utility
//!
//! Parses, compiles and decodes tunnel documents, generates keys, and
//! synchronizes addresses and routes of an interface via rtnetlink.

mod document;
mod keys;
mod link;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use wgtun::Result;

#[derive(Parser)]
#[command(name = "wgtun", version, about = "WireGuard tunnel configuration utility")]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a tunnel document and report what it contains
    Check {
        /// Tunnel document
        file: PathBuf,
    },

    /// Compile a tunnel document into the driver layout
    Compile {
        /// Tunnel document
        file: PathBuf,

        /// Write the buffer to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print as hex
        #[arg(long)]
        hex: bool,
    },

    /// Decode a compiled buffer back into a tunnel document
    Decode {
        /// Compiled buffer
        file: PathBuf,
    },

    /// Print a tunnel document in canonical form
    Show {
        /// Tunnel document
        file: PathBuf,
    },

    /// Generate a new private key
    Genkey,

    /// Derive public key from private key (reads from stdin)
    Pubkey,

    /// Generate a preshared key
    Genpsk,

    /// Add the document's addresses and peer routes to an interface
    Up {
        /// Interface index
        ifindex: u32,
        /// Tunnel document
        file: PathBuf,
    },

    /// Remove all addresses and routes from an interface
    Down {
        /// Interface index
        ifindex: u32,
    },

    /// Print status events for interfaces until interrupted
    Monitor {
        /// Interface indexes
        #[arg(required = true)]
        ifindex: Vec<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Check { file } => document::check(&file),
        Command::Compile { file, output, hex } => document::compile(&file, output.as_deref(), hex),
        Command::Decode { file } => document::decode(&file),
        Command::Show { file } => document::show(&file),
        Command::Genkey => keys::genkey(),
        Command::Pubkey => keys::pubkey(),
        Command::Genpsk => keys::genpsk(),
        Command::Up { ifindex, file } => link::up(ifindex, &file).await,
        Command::Down { ifindex } => link::down(ifindex).await,
        Command::Monitor { ifindex } => link::monitor(&ifindex).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
