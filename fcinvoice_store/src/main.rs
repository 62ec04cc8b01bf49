//! FCInvoice - CLI
//!
//! Administrative access to an encrypted invoice store.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use fcinvoice_store::{codec, InvoiceRepository, IvMode, StoreConfig};

#[derive(Parser)]
#[command(name = "fcinvoice")]
#[command(version = fcinvoice_store::VERSION)]
#[command(about = "FCInvoice - encrypted invoice store")]
struct Cli {
    /// Data directory (default: platform data dir, or FCINVOICE_DATA_DIR)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Protected key file (default: <data-dir>/KeyIV.dat, or FCINVOICE_KEY_FILE)
    #[arg(short, long, global = true)]
    key_file: Option<PathBuf>,

    /// JSON store configuration file
    #[arg(short, long, global = true, conflicts_with = "data_dir")]
    config: Option<PathBuf>,

    /// Read and write legacy records encrypted under the installation IV
    #[arg(long, global = true)]
    legacy_iv: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and installation key
    Init,

    /// List stored invoices, newest first
    List,

    /// Print one invoice as JSON
    Show {
        /// Invoice number
        id: String,
    },

    /// Allocate the next invoice number
    NextId {
        /// Four digit year (default: current year)
        #[arg(short, long)]
        period: Option<String>,
    },

    /// Delete an invoice
    Delete {
        /// Invoice number
        id: String,
    },

    /// Encrypt a JSON invoice into the store
    Import {
        /// JSON file; a missing invoice number is allocated
        path: PathBuf,
    },

    /// Decrypt an invoice to a JSON file
    Export {
        /// Invoice number
        id: String,

        /// Output path
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn resolve_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = match (&cli.config, &cli.data_dir) {
        (Some(path), _) => StoreConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        (None, Some(dir)) => StoreConfig::in_dir(dir),
        (None, None) => StoreConfig::default_location()?,
    };

    if let Some(key_file) = &cli.key_file {
        config = config.with_key_file(key_file);
    }
    if cli.legacy_iv {
        config = config.with_iv_mode(IvMode::Installation);
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli).await?;
    let repo = InvoiceRepository::open(config).await?;

    match cli.command {
        Commands::Init => {
            println!("✅ Store ready at: {}", repo.config().data_dir.display());
            println!("🔐 Key file:       {}", repo.config().key_path().display());
        }

        Commands::List => {
            let invoices = repo.load_all().await?;

            if invoices.is_empty() {
                println!("📭 No invoices in store");
            } else {
                println!("🧾 Invoices ({}):", invoices.len());
                println!("{:-<60}", "");
                for invoice in invoices {
                    println!(
                        "{:<9} {}  {:<28} {:>12}",
                        invoice.invoice_number.as_deref().unwrap_or("-"),
                        invoice.selected_date,
                        invoice.bill_to.as_deref().unwrap_or(""),
                        invoice.total().round_dp(2)
                    );
                }
            }
        }

        Commands::Show { id } => {
            let Some(invoice) = repo.load(&id).await? else {
                bail!("invoice {} not found or unreadable", id);
            };
            let json = codec::serialize(&invoice)?;
            println!("{}", String::from_utf8_lossy(&json));
            println!("Total: {}", invoice.total().round_dp(2));
        }

        Commands::NextId { period } => {
            let id = match period {
                Some(period) => repo.next_identifier_for(&period).await?,
                None => repo.generate_next_identifier().await?,
            };
            println!("{}", id);
        }

        Commands::Delete { id } => {
            repo.delete(&id).await?;
            println!("🗑️ Deleted: {}", id);
        }

        Commands::Import { path } => {
            let raw = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let mut invoice = codec::deserialize(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;

            if invoice.identifier().is_none() {
                invoice.invoice_number = Some(repo.generate_next_identifier().await?);
            }
            repo.save(&invoice).await?;
            println!(
                "📥 Imported as: {}",
                invoice.invoice_number.as_deref().unwrap_or_default()
            );
        }

        Commands::Export { id, output } => {
            let Some(invoice) = repo.load(&id).await? else {
                bail!("invoice {} not found or unreadable", id);
            };
            let json = codec::serialize(&invoice)?;
            tokio::fs::write(&output, &json)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            println!("📤 Exported {} to: {}", id, output.display());
        }
    }

    Ok(())
}
