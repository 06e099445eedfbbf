//! Consentry CLI
//!
//! Loads a page, brings the consent engine up on it and reports what
//! survived: cookies, executed scripts, blocked insertions.
//!
//!   consentry run --url https://shop.example.com/ --html index.html --action reject-all
//!   consentry classify --cookie _ga --script https://connect.facebook.net/en_US/fbevents.js
//!   consentry check consent.json

mod commands;
mod report;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "consentry",
    version,
    about = "Cookie consent enforcement, simulated against a page"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Leave the visitor undecided
    None,
    AcceptAll,
    RejectAll,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a page
    Run {
        /// Page URL (sets the cookie host and path)
        #[arg(short, long, default_value = "https://www.example.com/")]
        url: String,

        /// HTML whose <script> tags seed the page
        #[arg(long)]
        html: Option<PathBuf>,

        /// Widget configuration as JSON
        #[arg(short, long, env = "CONSENTRY_CONFIG")]
        config: Option<PathBuf>,

        /// Set-Cookie headers received before the engine starts
        #[arg(long = "header", value_name = "SET_COOKIE")]
        headers: Vec<String>,

        /// document.cookie writes made by page scripts after init
        #[arg(short, long = "write", value_name = "ASSIGNMENT")]
        writes: Vec<String>,

        /// Script URLs inserted dynamically after init
        #[arg(short, long = "script", value_name = "SRC")]
        scripts: Vec<String>,

        /// Consent decision to simulate
        #[arg(short, long, value_enum, default_value = "none")]
        action: Action,

        /// Save exactly these categories instead of an all-or-nothing action
        #[arg(long = "select", value_name = "CATEGORY", conflicts_with = "action")]
        selection: Vec<String>,

        /// Set-Cookie headers received after the decision
        #[arg(long = "late-header", value_name = "SET_COOKIE")]
        late_headers: Vec<String>,

        /// Keep the page alive this long so periodic sweeps run
        #[arg(long, default_value_t = 0)]
        linger_ms: u64,

        /// Lock the cookie property and node insertion before init
        #[arg(long)]
        harden: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which category cookie names and script URLs fall into
    Classify {
        #[arg(long = "cookie", value_name = "NAME")]
        cookies: Vec<String>,

        #[arg(long = "script", value_name = "SRC")]
        scripts: Vec<String>,
    },

    /// Validate a configuration file
    Check {
        #[arg(default_value = "consent.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    consent_core::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            url,
            html,
            config,
            headers,
            writes,
            scripts,
            action,
            selection,
            late_headers,
            linger_ms,
            harden,
            json,
        } => {
            let options = commands::RunOptions {
                url,
                html,
                config,
                headers,
                writes,
                scripts,
                action,
                selection,
                late_headers,
                linger_ms,
                harden,
            };
            let report = commands::run(options).await?;
            report::print_run(&report, json)?;
        }
        Commands::Classify { cookies, scripts } => {
            commands::classify(&cookies, &scripts);
        }
        Commands::Check { config } => {
            commands::check(&config)?;
        }
    }

    Ok(())
}
