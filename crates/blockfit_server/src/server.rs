//! Accept loop and per-connection handling

use crate::api::{self, AppState};
use crate::http::{self, HttpError, Request, Response};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_body_bytes: usize,
    /// Deadline for receiving the full request, head and body.
    pub read_timeout: Duration,
}

/// Serve connections from `listener` until `shutdown` resolves.
///
/// Each connection gets its own task. In-flight connections are left to
/// finish on their own.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    limits: ConnectionLimits,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, no longer accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!("accept failed: {e}");
                        continue;
                    }
                };
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &state, limits).await {
                        tracing::debug!(%peer, "connection error: {e}");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: &AppState,
    limits: ConnectionLimits,
) -> Result<(), HttpError> {
    let mut stream = BufReader::new(stream);

    let read = tokio::time::timeout(
        limits.read_timeout,
        read_request(&mut stream, limits.max_body_bytes),
    );
    let Ok(received) = read.await else {
        tracing::debug!("request not received within {:?}", limits.read_timeout);
        let response = Response::error(408, "Request not received in time");
        http::write_response(&mut stream, &response).await?;
        stream.get_mut().shutdown().await?;
        return Ok(());
    };

    let response = match received {
        Ok(request) => {
            tracing::trace!(method = request.method(), path = request.path(), "request");
            api::handle(state, &request)
        }
        Err(HttpError::ConnectionClosed) => return Ok(()),
        Err(e @ HttpError::Io(_)) => return Err(e),
        Err(e @ HttpError::BodyTooLarge { .. }) => Response::error(413, e.to_string()),
        Err(e @ HttpError::Malformed(_)) => Response::error(400, e.to_string()),
    };

    http::write_response(&mut stream, &response).await?;
    stream.get_mut().shutdown().await?;
    Ok(())
}

async fn read_request(
    stream: &mut BufReader<TcpStream>,
    max_body_bytes: usize,
) -> Result<Request, HttpError> {
    let head = http::read_head(stream).await?;
    if head.expects_continue() && head.content_length()? <= max_body_bytes {
        http::write_continue(stream.get_mut()).await?;
    }
    let body = http::read_body(stream, &head, max_body_bytes).await?;
    Ok(Request { head, body })
}
