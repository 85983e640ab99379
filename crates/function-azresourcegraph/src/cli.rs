//! Command line interface of the function binary.
//!
//! ```rust
//! use clap::Parser;
//! use function_azresourcegraph::cli::{Command, Opts};
//!
//! let opts = Opts::parse_from(["function-azresourcegraph", "run", "--credentials-name", "pool"]);
//! let Command::Run(arguments) = opts.command;
//! assert_eq!(arguments.credentials_name, "pool");
//! ```
use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use function_telemetry::tracing::TelemetryOptions;

use crate::{
    function::DEFAULT_CREDENTIALS_NAME,
    query::AzureOptions,
    server::FunctionServer,
};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(author, version, about)]
pub struct Opts {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the function server.
    Run(RunArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct RunArguments {
    /// Address the function server listens on.
    #[arg(long, env, default_value_t = FunctionServer::DEFAULT_SOCKET_ADDRESS)]
    pub address: SocketAddr,

    /// Name of the credentials holding the service principal(s).
    #[arg(long, env, default_value = DEFAULT_CREDENTIALS_NAME)]
    pub credentials_name: String,

    #[command(flatten)]
    pub azure: AzureArguments,

    // Flattened structs go last to keep the help headings intact.
    #[command(flatten)]
    pub telemetry: TelemetryOptions,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct AzureArguments {
    /// Microsoft Entra ID authority access tokens are requested from.
    #[arg(long, env, default_value = AzureOptions::DEFAULT_AUTHORITY_HOST)]
    pub azure_authority_host: String,

    /// Azure Resource Manager endpoint queries are sent to.
    #[arg(long, env, default_value = AzureOptions::DEFAULT_RESOURCE_MANAGER_ENDPOINT)]
    pub azure_resource_manager_endpoint: String,

    /// Federated token FILE used by the workload identity.
    #[arg(long, env, value_name = "FILE")]
    pub azure_federated_token_file: Option<PathBuf>,
}

impl From<AzureArguments> for AzureOptions {
    fn from(arguments: AzureArguments) -> Self {
        Self {
            authority_host: arguments.azure_authority_host,
            resource_manager_endpoint: arguments.azure_resource_manager_endpoint,
            federated_token_file: arguments.azure_federated_token_file,
        }
    }
}
