//! testagentd entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use testagentd::server::{Server, ServerConfig, ServerError};

#[derive(Parser)]
#[command(name = "testagentd")]
#[command(about = "Remote execution daemon for unattended test machines", version)]
struct Cli {
    /// Log protocol-level details
    #[arg(long)]
    debug: bool,

    /// TCP port to listen on
    port: u16,

    /// Only accept connections originating from this host
    srchost: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let config = ServerConfig {
        port: cli.port,
        srchost: cli.srchost,
    };
    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(err @ (ServerError::Resolve { .. } | ServerError::NoAddresses { .. })) => {
            error!("{err}");
            return ExitCode::from(2);
        }
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    match server.run() {
        Ok(()) => {
            info!("exiting for upgrade");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
