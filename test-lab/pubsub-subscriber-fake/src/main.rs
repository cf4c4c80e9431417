#![warn(missing_docs)]
//! # Pubsub Subscriber Fake
//!
//! This software mimics an application subscribing to pubsub topics through a Dapr sidecar. It
//! records the messages delivered on three topics and exposes control routes so a test harness
//! can check the delivery semantics (redelivery, retry, error and empty responses).
//!
//! The fake subscriber uses Axum as web server with tower for logging.
mod application;
mod entities;
mod handlers;
mod message;
mod shared_state;

use clap::Parser;
use tracing::{Level, debug, error};

use crate::application::Application;
use crate::entities::DEFAULT_PUBSUB_NAME;

type StdResult<T> = anyhow::Result<T>;

/// Possible command line options and arguments
#[derive(Debug, Parser)]
#[command(version)]
pub struct CliArguments {
    /// Verbosity level  (-v WARN, -vv INFO, -vvv DEBUG, etc)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TCP port to listen on
    #[arg(short = 'p', long, default_value_t = 3000)]
    tcp_port: u16,

    /// IP Address to bind server to
    #[arg(short, long, default_value = "0.0.0.0")]
    ip_address: String,

    /// Quiet mode, no log will be emitted. Critical error messages will still pop on STDERR
    #[arg(short, long, default_value_t = false)]
    quiet: bool,

    /// Name of the pubsub component the topics are subscribed on
    #[arg(long, default_value = DEFAULT_PUBSUB_NAME)]
    pubsub_name: String,
}

impl CliArguments {
    /// converts the inner logging level to Tracing Level.
    pub fn get_verbosity_level(&self) -> Option<Level> {
        if self.quiet {
            None
        } else {
            match self.verbose {
                0 => Some(Level::ERROR),
                1 => Some(Level::WARN),
                2 => Some(Level::INFO),
                3 => Some(Level::DEBUG),
                _ => Some(Level::TRACE),
            }
        }
    }
}

#[tokio::main]
async fn main() -> StdResult<()> {
    let params = CliArguments::parse();

    if let Some(level) = params.get_verbosity_level() {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    let result = Application::run(params).await;

    match &result {
        Err(e) => error!("{e:?}"),
        Ok(_) => debug!("soft terminated"),
    };

    result
}
