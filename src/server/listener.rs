use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::http::connection::Connection;
use crate::server::AppState;

/// Binds `listen_addr` and serves until the task is dropped.
pub async fn run(listen_addr: &str, app: Arc<AppState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!(
        "Listening on {}, relaying to {}",
        listener.local_addr()?,
        app.forwarder.upstream().base_url
    );

    serve(listener, app).await
}

/// Accepts connections on an already bound listener, one task each.
pub async fn serve(listener: TcpListener, app: Arc<AppState>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
                continue;
            }
        };
        tracing::debug!("Accepted connection from {}", peer);

        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, app);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
