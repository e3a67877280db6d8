use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::account::Ledger;
use crate::broker::Broker;
use crate::config::Settings;
use crate::transport::http::{AppState, create_router};
use crate::utils::error::Result;

/// Wires the broker, the ledger and the routes together from `settings`.
pub fn build_app(settings: &Settings) -> Result<Router> {
    let broker = Arc::new(Broker::new(settings.broker.clone()));
    let ledger = Ledger::new(settings.accounts.initial_balance);
    let state = Arc::new(AppState::new(
        broker,
        ledger,
        settings.accounts.default_account.clone(),
    ));
    create_router(state, &settings.server.allowed_origin)
}

/// Serves HTTP and WebSocket traffic on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, settings: &Settings, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_app(settings)?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
