use std::sync::Arc;

use clap::Parser;
use function_azresourcegraph::{
    Function,
    cli::{Command, Opts, RunArguments},
    query::{AzureOptions, AzureResourceGraph, QueryError},
    server::{FunctionServer, ServerError},
    signal::{SignalError, SignalWatcher},
};
use function_telemetry::Tracing;
use snafu::{ResultExt, Snafu};

const APP_NAME: &str = "function-azresourcegraph";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize tracing"))]
    InitTracing {
        source: function_telemetry::tracing::Error,
    },

    #[snafu(display("failed to create Azure Resource Graph client"))]
    CreateClient { source: QueryError },

    #[snafu(display("failed to register termination signal handlers"))]
    RegisterSignals { source: SignalError },

    #[snafu(display("failed to run function server"))]
    RunServer { source: ServerError },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let opts = Opts::parse();

    match opts.command {
        Command::Run(arguments) => run(arguments).await,
    }
}

async fn run(arguments: RunArguments) -> Result<(), Error> {
    let RunArguments {
        address,
        credentials_name,
        azure,
        telemetry,
    } = arguments;

    // The guard flushes pending file logs when dropped, so it has to live
    // until the server stopped.
    let _tracing_guard = Tracing::from_options(APP_NAME, telemetry)
        .init()
        .context(InitTracingSnafu)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        %address,
        %credentials_name,
        "starting {APP_NAME}"
    );

    let client = AzureResourceGraph::new(AzureOptions::from(azure)).context(CreateClientSnafu)?;
    let function = Function::new(Arc::new(client)).with_credentials_name(credentials_name);

    let signal_watcher = SignalWatcher::termination().context(RegisterSignalsSnafu)?;
    let shutdown = signal_watcher.handle();

    FunctionServer::new(Arc::new(function), address, signal_watcher)
        .run(shutdown)
        .await
        .context(RunServerSnafu)
}
