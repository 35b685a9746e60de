//! hubadm CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

use commands::GlobalArgs;

/// hubadm - join clusters to a hub
#[derive(Parser, Debug)]
#[command(name = "hubadm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Produce bootstrap material and cluster metadata
    Get(commands::get::GetArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Get(args) => commands::get::run(&self.global, args).await,
        }
    }
}
