//! WebSocket transport
//!
//! Accepts TCP connections, upgrades the ones addressed to the realtime path
//! and hands each upgraded stream to `run_session`. Requests for any other
//! path are refused during the handshake with `404 Not Found`; the query
//! string (`apikey`, `vsn`, ...) is ignored.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quickchat_config::Settings;
use quickchat_hub::Hub;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async_with_config;
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::WebSocketConfig;

use crate::error::TransportError;
use crate::session::{SessionOptions, run_session};

/// Bind `addr` and serve until the task is dropped.
pub async fn start_websocket_server(
    addr: String,
    hub: Hub,
    settings: Settings,
) -> Result<(), TransportError> {
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "WebSocket server listening on ws://{addr}{}",
        settings.server.websocket_path
    );
    serve(listener, hub, settings).await;
    Ok(())
}

/// Accept connections from an already bound listener.
pub async fn serve(listener: TcpListener, hub: Hub, settings: Settings) {
    let options = SessionOptions::from(&settings.realtime);
    let path: Arc<str> = Arc::from(settings.server.websocket_path.as_str());
    let ws_config = settings.realtime.max_message_size.map(|max| {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(max);
        config
    });

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let hub = hub.clone();
        let path = path.clone();
        let options = options.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, hub, path, options, ws_config).await;
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Hub,
    path: Arc<str>,
    options: SessionOptions,
    ws_config: Option<WebSocketConfig>,
) {
    let check_path = |request: &Request, response: Response| {
        if request.uri().path() == &*path {
            Ok(response)
        } else {
            debug!(%peer, path = request.uri().path(), "refusing upgrade for unknown path");
            Err(not_found())
        }
    };

    let ws = match accept_hdr_async_with_config(stream, check_path, ws_config).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    debug!(%peer, "connection upgraded");
    run_session(hub, ws, options).await;
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("Not Found".to_string()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
