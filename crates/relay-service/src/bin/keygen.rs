//! Relayer key utility
//!
//! Commands:
//! - generate: Create a new relayer keypair and print its RELAYER_PRIVATE_KEY value
//! - address: Show the address for an existing secret

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repute_relay::RelayerAuthority;

#[derive(Parser)]
#[command(name = "repute-keygen")]
#[command(about = "Relayer key generation utility")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new relayer keypair
    Generate,

    /// Show the address of a relayer secret
    Address {
        /// Secret as a JSON byte array (defaults to RELAYER_PRIVATE_KEY)
        #[arg(short, long, env = "RELAYER_PRIVATE_KEY", hide_env_values = true)]
        secret: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate => generate(),
        Commands::Address { secret } => show_address(&secret)?,
    }

    Ok(())
}

fn generate() {
    let authority = RelayerAuthority::generate();

    println!("=== Repute Relayer Key Generator ===\n");

    println!("ADDRESS (fund this account to pay issuance fees):");
    println!("  {}", authority.address());
    println!();

    println!("RELAYER_PRIVATE_KEY (keep secret!):");
    println!("  {}", authority.to_json_secret());
    println!();
}

fn show_address(secret: &str) -> Result<()> {
    let authority =
        RelayerAuthority::from_json_secret(secret).context("Failed to parse relayer secret")?;
    println!("{}", authority.address());
    Ok(())
}
