//! Modbus TCP listener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use errors::SlaveError;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::serve_connection;
use crate::connection::{Connection, StreamConnection};
use crate::engine::Engine;
use crate::frame::FrameKind;
use crate::registry::TransportKind;
use crate::Result;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind `addr`, register the listener and start accepting
pub(crate) async fn listen(engine: &Engine, addr: &str) -> Result<SocketAddr> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| SlaveError::BindFailed {
            endpoint: addr.to_string(),
            reason: e.to_string(),
        })?;
    let local = listener.local_addr()?;
    info!("Modbus TCP listening on {}", local);

    let token = CancellationToken::new();
    let task = tokio::spawn(accept_loop(engine.clone(), listener, local, token.clone()));
    engine
        .transports()
        .register(local.to_string(), TransportKind::Tcp, token, task);
    Ok(local)
}

async fn accept_loop(
    engine: Engine,
    listener: TcpListener,
    local: SocketAddr,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("Accepted Modbus connection from {}", peer);
                    if let Err(e) = stream.set_nodelay(true) {
                        error!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                    }
                    let (reader, writer) = stream.into_split();
                    let conn: Arc<dyn Connection> =
                        Arc::new(StreamConnection::new(peer.to_string(), writer));
                    tokio::spawn(serve_connection(
                        engine.clone(),
                        reader,
                        conn,
                        FrameKind::Tcp,
                        token.child_token(),
                    ));
                },
                Err(e) => {
                    error!("Failed to accept connection on {}: {}", local, e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                },
            },
        }
    }
    // Listener socket closes on drop
    info!("Modbus TCP listener on {} stopped", local);
}
