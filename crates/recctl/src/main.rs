//! Recommender admin CLI
//!
//! Manages the applications and timeframes the recommender works on and
//! shows the container recommendations it stored.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{apps, resources, timeframes};
use recommender_lib::{FileStore, TimeframeStatus};
use std::path::PathBuf;

/// Recommender admin CLI
#[derive(Parser)]
#[command(name = "recctl")]
#[command(author, version, about = "Admin CLI for the resource recommender", long_about = None)]
pub struct Cli {
    /// Store snapshot file shared with the recommender
    #[arg(long, env = "RECCTL_STORE", default_value = "recommender-store.json")]
    pub store: PathBuf,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage applications
    #[command(subcommand)]
    App(AppCommands),

    /// Manage timeframes
    #[command(subcommand)]
    Timeframe(TimeframeCommands),

    /// Show stored container recommendations
    Resources {
        /// Only this application
        #[arg(long)]
        app: Option<String>,

        /// Recommendations of this timeframe instead of current ones
        #[arg(long)]
        timeframe: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AppCommands {
    /// Register an application
    Add { name: String },

    /// List applications
    List,

    /// Rename an application
    Rename { name: String, new_name: String },

    /// Delete an application and its recommendations
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum TimeframeCommands {
    /// Create a timeframe
    Add {
        name: String,

        /// Window start (RFC 3339 or "YYYY-MM-DD HH:MM:SS" UTC)
        #[arg(long)]
        start: String,

        /// Window end (RFC 3339 or "YYYY-MM-DD HH:MM:SS" UTC)
        #[arg(long)]
        end: String,

        /// Schedule the timeframe for the next cycle
        #[arg(long)]
        on: bool,

        #[arg(long)]
        description: Option<String>,
    },

    /// List timeframes
    List,

    /// Schedule a timeframe for the next cycle
    On { name: String },

    /// Stop a scheduled timeframe
    Off { name: String },

    /// Delete a timeframe and its recommendations
    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let store = FileStore::new(&cli.store);

    match cli.command {
        Commands::App(app_cmd) => match app_cmd {
            AppCommands::Add { name } => apps::add(&store, &name, cli.format).await?,
            AppCommands::List => apps::list(&store, cli.format).await?,
            AppCommands::Rename { name, new_name } => {
                apps::rename(&store, &name, &new_name).await?
            }
            AppCommands::Delete { name } => apps::delete(&store, &name).await?,
        },
        Commands::Timeframe(tf_cmd) => match tf_cmd {
            TimeframeCommands::Add {
                name,
                start,
                end,
                on,
                description,
            } => {
                let args = timeframes::AddTimeframe {
                    name,
                    start,
                    end,
                    on,
                    description,
                };
                timeframes::add(&store, args, cli.format).await?
            }
            TimeframeCommands::List => timeframes::list(&store, cli.format).await?,
            TimeframeCommands::On { name } => {
                timeframes::set_status(&store, &name, TimeframeStatus::On).await?
            }
            TimeframeCommands::Off { name } => {
                timeframes::set_status(&store, &name, TimeframeStatus::Off).await?
            }
            TimeframeCommands::Delete { name } => timeframes::delete(&store, &name).await?,
        },
        Commands::Resources { app, timeframe } => {
            resources::show(&store, app, timeframe, cli.format).await?
        }
    }

    Ok(())
}
