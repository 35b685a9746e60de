//! Get command - produce bootstrap material and cluster metadata

mod cluster_info;
mod hubconfig;

use clap::{Args, Subcommand};

pub use cluster_info::ClusterInfoArgs;
pub use hubconfig::HubconfigArgs;

use super::GlobalArgs;
use crate::Result;

/// Get bootstrap material or cluster metadata
#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(subcommand)]
    pub resource: GetResource,
}

/// What to get
#[derive(Subcommand, Debug)]
pub enum GetResource {
    /// Establish trust with a hub and store the bootstrap kubeconfig Secret
    Hubconfig(HubconfigArgs),
    /// Snapshot this cluster's identity, optionally storing it
    ClusterInfo(ClusterInfoArgs),
}

/// Run the get command
pub async fn run(global: &GlobalArgs, args: GetArgs) -> Result<()> {
    match args.resource {
        GetResource::Hubconfig(args) => hubconfig::run(global, args).await,
        GetResource::ClusterInfo(args) => cluster_info::run(global, args).await,
    }
}
