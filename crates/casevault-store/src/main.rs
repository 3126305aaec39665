//! Casevault command line.
//!
//! # Usage
//!
//! ```bash
//! # Seal a file into the vault (original kept in place)
//! casevault store bodycam.mp4
//!
//! # Seal and destroy the plaintext original
//! casevault store bodycam.mp4 --consume
//!
//! # List stored evidence
//! casevault list
//!
//! # Decrypt as a dispatcher
//! casevault fetch /evidence/1724-ab12cd34.mp4.enc --role dispatcher
//!
//! # Audit one file and its backup replica
//! casevault verify /evidence/1724-ab12cd34.mp4.enc
//! ```

use std::path::PathBuf;

use casevault_store::{
    AccessGate, EvidenceSource, EvidenceStore, FsBackend, KEY_ENV, KeySource, Role, VaultConfig,
    load_key_from_env,
};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Encrypted evidence vault
#[derive(Parser, Debug)]
#[command(name = "casevault")]
#[command(about = "Encrypted evidence vault with primary and backup storage")]
#[command(version)]
struct Args {
    /// Vault data directory
    #[arg(long, default_value = "vault-data")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seal a plaintext file into the vault
    Store {
        /// File to ingest
        file: PathBuf,

        /// Destroy the plaintext file once the store succeeds
        #[arg(long)]
        consume: bool,
    },

    /// List locators of stored evidence
    List,

    /// Decrypt one evidence file to disk
    Fetch {
        /// Evidence locator (/evidence/<name>.enc)
        locator: String,

        /// Role presented for the decrypt check (repeatable)
        #[arg(long = "role", value_name = "ROLE")]
        roles: Vec<Role>,

        /// Output path; defaults to the recorded download name
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Audit one evidence file and its backup replica
    Verify {
        /// Evidence locator (/evidence/<name>.enc)
        locator: String,
    },
}

type FsVault = EvidenceStore<FsBackend, FsBackend>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let (key, key_source) = load_key_from_env()?;
    if key_source == KeySource::DevFallback {
        tracing::warn!("{KEY_ENV} is not set - using a deterministic development key");
        tracing::warn!("This is NOT suitable for production use!");
    }

    let config = VaultConfig::new(&args.data_dir);
    let (primary, backup) = config.open_backends()?;
    let vault = EvidenceStore::new(primary, backup, key, AccessGate::default());

    match args.command {
        Command::Store { file, consume } => run_store(&vault, file, consume).await?,
        Command::List => run_list(&vault).await?,
        Command::Fetch { locator, roles, output } => {
            run_fetch(&vault, &locator, &roles, output).await?;
        },
        Command::Verify { locator } => run_verify(&vault, &locator).await?,
    }

    Ok(())
}

#[allow(clippy::print_stdout, reason = "command output")]
async fn run_store(
    vault: &FsVault,
    file: PathBuf,
    consume: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let submitted_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .map(ToString::to_string)
        .unwrap_or_default();

    let source = if consume {
        EvidenceSource::from_path(&file)
    } else {
        EvidenceSource::from_reader(tokio::fs::File::open(&file).await?)
    };

    let receipt = vault.store(source, &submitted_name).await?;
    if let Some(warning) = &receipt.cleanup {
        tracing::warn!("{warning}");
    }

    println!("{}", receipt.locator);
    println!("  sha256: {}", receipt.digest);
    println!("  size:   {} bytes", receipt.size);
    Ok(())
}

#[allow(clippy::print_stdout, reason = "command output")]
async fn run_list(vault: &FsVault) -> Result<(), Box<dyn std::error::Error>> {
    let locators = vault.list().await?;
    for locator in &locators {
        println!("{locator}");
    }
    tracing::debug!("Listed {} evidence file(s)", locators.len());
    Ok(())
}

#[allow(clippy::print_stdout, reason = "command output")]
async fn run_fetch(
    vault: &FsVault,
    locator: &str,
    roles: &[Role],
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = vault.retrieve(locator, roles).await?;
    let out_path = output.unwrap_or_else(|| PathBuf::from(reader.download_name()));

    let mut out = tokio::fs::File::create(&out_path).await?;
    while let Some(chunk) = reader.read_chunk().await? {
        out.write_all(&chunk).await?;
    }
    out.flush().await?;

    println!("{} -> {} ({} bytes)", locator, out_path.display(), reader.plaintext_len());
    Ok(())
}

#[allow(clippy::print_stdout, reason = "command output")]
async fn run_verify(vault: &FsVault, locator: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = vault.verify(locator).await?;
    println!("{} OK ({} ciphertext bytes, backup identical)", report.locator, report.ciphertext_len);
    Ok(())
}
