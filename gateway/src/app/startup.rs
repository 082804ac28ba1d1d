use core::{
    future::IntoFuture as _,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use eyre::WrapErr as _;
use tokio::{net, signal, sync::watch, task::JoinHandle, time};
use tracing::{Instrument as _, info, warn};

use crate::{
    app::{AppState, session::SessionStore, state::initialize_state},
    config::AppConfig,
    http,
};

/// How long in-flight requests may take to drain after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Creates a future that resolves when SIGINT or SIGTERM is received.
///
/// # Panics
///
/// Panics if the signal handlers cannot be installed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to create SIGTERM signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = core::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Periodically delete expired session rows.
pub(crate) fn spawn_session_sweeper(sessions: SessionStore) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut interval = time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                match sessions.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Purged expired sessions"),
                    Err(e) => warn!(error = ?e, "Failed to purge expired sessions"),
                }
            }
        }
        .instrument(tracing::info_span!("session_sweeper")),
    )
}

/// Serve until a shutdown signal arrives, then drain for at most [`SHUTDOWN_GRACE`].
pub(crate) async fn start_server(app_state: AppState, addr: SocketAddr) -> eyre::Result<()> {
    let app = http::create_app(app_state);

    let listener = net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let graceful = async move {
        drop(shutdown_rx.wait_for(|&stop| stop).await);
    };
    let server = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(graceful)
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        res = &mut server => return res.wrap_err("server error"),
        () = shutdown_signal() => {
            info!("Received shutdown, draining in-flight requests");
            drop(shutdown_tx.send(true));
        }
    }

    if let Ok(res) = time::timeout(SHUTDOWN_GRACE, &mut server).await {
        res.wrap_err("server error")?;
        info!("Shutdown complete");
    } else {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Grace period elapsed, dropping remaining connections"
        );
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if a dependency cannot be initialised or the server cannot bind.
pub(crate) async fn start(config: AppConfig) -> eyre::Result<()> {
    info!("Starting HTTP server...");

    let listen_ip: IpAddr = config
        .server
        .bind
        .parse()
        .wrap_err_with(|| format!("invalid bind address {}", config.server.bind))?;
    let addr = SocketAddr::from((listen_ip, config.server.port));

    let app_state = initialize_state(config).await?;
    let sweeper = spawn_session_sweeper(app_state.sessions.clone());

    let result = start_server(app_state, addr).await;
    sweeper.abort();
    result
}
