//! # Agentprint CLI
//!
//! Command-line front end for the printer session, used on agent laptops
//! and for bench-testing printers before they are issued.
//!
//! ## Usage
//!
//! ```bash
//! # Find the printer
//! agentprint scan
//!
//! # Print plain text, or the alignment test page
//! agentprint print "Hello"
//! agentprint print --file note.txt
//! agentprint print --test-page
//!
//! # Print a collection receipt (inline JSON or a file)
//! agentprint receipt receipt.json
//!
//! # Render the HTML receipt for the system print dialog
//! agentprint html receipt.json --output receipt.html
//!
//! # Stream scale readings until 20 have arrived
//! agentprint watch --samples 20
//! ```
//!
//! Logging goes to stderr; set `RUST_LOG=debug` for transport detail.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use agentprint::{
    PrinterError, PrinterSession, SessionConfig,
    receipt::ReceiptContext,
    transport::{BluezAdapter, HostPermissions},
};

/// Agentprint - Bluetooth receipt printer utility
#[derive(Parser, Debug)]
#[command(name = "agentprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Session configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// RFCOMM channel to bind (overrides the configuration file)
    #[arg(long, global = true)]
    channel: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find the allow-listed printer and show it
    Scan,

    /// Print plain text
    Print {
        /// Text to print
        text: Option<String>,

        /// Read the text from a file instead
        #[arg(long, value_name = "FILE", conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Print the alignment test page
        #[arg(long, conflicts_with_all = ["text", "file"])]
        test_page: bool,
    },

    /// Print a collection receipt
    Receipt {
        /// Receipt JSON, inline or as a file path
        receipt: String,
    },

    /// Render a collection receipt as HTML (no printer needed)
    Html {
        /// Receipt JSON, inline or as a file path
        receipt: String,

        /// Write to a file instead of stdout
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Connect and stream scale readings
    Watch {
        /// Stop after this many readings (runs until Ctrl-C if omitted)
        #[arg(long)]
        samples: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), PrinterError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(channel) = cli.channel {
        config.rfcomm_channel = channel;
    }

    let adapter = BluezAdapter::new(config.discovery_secs, config.rfcomm_channel)
        .with_chunk_size(config.printer_config().chunk_size);
    let session = PrinterSession::open(config, Arc::new(HostPermissions), Arc::new(adapter));

    let result = run_command(&session, cli.command).await;
    session.close().await;
    result
}

async fn run_command(session: &PrinterSession, command: Commands) -> Result<(), PrinterError> {
    match command {
        Commands::Scan => {
            let device = session.scan().await?;
            println!("Found {}", device);
        }

        Commands::Print {
            text,
            file,
            test_page,
        } => {
            let text = match (text, file) {
                (Some(text), _) => Some(text),
                (None, Some(path)) => Some(std::fs::read_to_string(path)?),
                (None, None) => None,
            };
            if text.is_none() && !test_page {
                return Err(PrinterError::Config(
                    "Nothing to print. Pass TEXT, --file or --test-page".to_string(),
                ));
            }

            let device = session.request_scan_and_connect().await?;
            println!("Printing to {}...", device);
            match text {
                Some(text) => session.print_text(&text).await?,
                None => session.print_test_page().await?,
            }
            println!("Printed successfully!");
        }

        Commands::Receipt { receipt } => {
            let ctx = load_receipt(&receipt)?;
            let device = session.request_scan_and_connect().await?;
            println!("Printing receipt {} to {}...", ctx.receipt_no, device);
            session.print_formatted_receipt(&ctx).await?;
            println!("Printed successfully!");
        }

        // Rendering HTML never touches Bluetooth
        Commands::Html { receipt, output } => {
            let html = session.render_html(&load_receipt(&receipt)?);
            match output {
                Some(path) => {
                    std::fs::write(&path, html)?;
                    println!("Saved to {}", path.display());
                }
                None => print!("{}", html),
            }
        }

        Commands::Watch { samples } => watch(session, samples).await?,
    }

    Ok(())
}

/// Print every reading as it arrives, marking stable ones.
async fn watch(session: &PrinterSession, samples: Option<usize>) -> Result<(), PrinterError> {
    let device = session.request_scan_and_connect().await?;
    println!("Watching {} (Ctrl-C to stop)", device);

    let mut telemetry = session.telemetry();
    let mut seen = 0;
    loop {
        tokio::select! {
            changed = telemetry.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = telemetry.borrow_and_update().clone();
                let Some(latest) = state.latest else {
                    continue;
                };
                let marker = if state.stability.is_stable { "  [stable]" } else { "" };
                println!("{}{}", latest, marker);

                seen += 1;
                if samples.is_some_and(|n| seen >= n) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

/// Parse receipt JSON given inline or as a path to a file.
fn load_receipt(arg: &str) -> Result<ReceiptContext, PrinterError> {
    let json = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        std::fs::read_to_string(Path::new(arg))?
    };
    ReceiptContext::from_json(&json)
        .map_err(|e| PrinterError::Config(format!("Invalid receipt: {}", e)))
}
