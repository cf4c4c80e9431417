use std::future::IntoFuture;

use anyhow::{Context, anyhow};
use futures::stream::StreamExt;
use signal_hook::consts::*;
use signal_hook_tokio::Signals;
use tracing::{debug, info, trace, warn};

use crate::shared_state::{AppState, SharedState};
use crate::{CliArguments, StdResult, handlers};

/// Structure to hold signal listener
pub struct OsSignalHandler;

impl OsSignalHandler {
    /// define what to do when a signal is caught
    pub async fn handle_signal(mut signals: Signals) {
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT | SIGQUIT => {
                    warn!("Signal caught: {signal}, exiting…");

                    break;
                }
                SIGHUP => {
                    info!("SIGHUP signal caught.");
                }
                _ => unreachable!(),
            }
        }
    }
}

/// Application controller
pub struct Application;

impl Application {
    /// main async runner
    pub async fn run(params: CliArguments) -> StdResult<()> {
        info!(
            "starting Pubsub Subscriber Fake version {}",
            env!("CARGO_PKG_VERSION")
        );

        trace!("setting up signal hook…");
        // supported signals
        let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])?;

        // launch signal detector
        let signal_handler = signals.handle();

        trace!("setting up shared state…");
        debug!("subscribing on pubsub component '{}'", params.pubsub_name);
        let shared_state: SharedState = AppState::new(&params.pubsub_name).into();

        trace!("configuring router…");
        let app = handlers::subscriber_router().with_state(shared_state);

        let listener = {
            let connection_string = format!("{}:{}", params.ip_address, params.tcp_port);
            debug!("binding on {connection_string}");
            tokio::net::TcpListener::bind(&connection_string)
                .await
                .with_context(|| format!("Could not listen on '{connection_string}'."))?
        };
        info!(
            "listening on http://{}",
            listener.local_addr().with_context(|| "Could not read bound address.")?
        );

        trace!("starting server…");
        let result = tokio::select!(
            res = axum::serve(listener, app).into_future() => res.map_err(|e| anyhow!(e)),
            _res = OsSignalHandler::handle_signal(signals) => Ok(()),
        );

        trace!("closing signal handler…");
        signal_handler.close();

        result
    }
}
