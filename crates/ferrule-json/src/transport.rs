//! Connecting an engine to its client.

use ferrule::{Engine, ExitStatus};
use tokio::net::TcpListener;
use tracing::info;

use crate::cli::Transport;
use crate::error::{Error, Result};

/// Serve one client over `transport`.
///
/// # Errors
///
/// Fails if the listener cannot be bound or the connection breaks.
pub async fn run(engine: Engine, transport: &Transport) -> Result<ExitStatus> {
    match transport {
        Transport::Stdio => {
            info!("Serving on stdio");
            Ok(engine.serve(tokio::io::stdin(), tokio::io::stdout()).await?)
        }
        Transport::Tcp { host, port } => {
            let listener = TcpListener::bind((host.as_str(), *port))
                .await
                .map_err(|source| Error::Bind {
                    address: format!("{host}:{port}"),
                    source,
                })?;
            serve_listener(engine, listener).await
        }
    }
}

/// Accept the first connection on `listener` and serve it.
///
/// The listener is dropped once a client connects.
///
/// # Errors
///
/// Fails if accepting or serving the connection fails.
pub async fn serve_listener(engine: Engine, listener: TcpListener) -> Result<ExitStatus> {
    info!(address = %listener.local_addr()?, "Waiting for client");
    let (stream, peer) = listener.accept().await?;
    drop(listener);
    info!(%peer, "Client connected");

    let (input, output) = stream.into_split();
    Ok(engine.serve(input, output).await?)
}
