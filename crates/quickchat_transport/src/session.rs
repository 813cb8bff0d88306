//! Connection session
//!
//! Each connection runs two pumps that only talk to each other through the
//! session's bounded outbound queue:
//! - the read pump decodes inbound frames and hands envelopes to the protocol;
//!   it runs on the connection task
//! - the write pump drains the queue onto the socket and sends keepalive
//!   pings; it runs on its own task
//!
//! Shutdown paths:
//! - peer closes, read error or read deadline: the read pump returns, the
//!   session is unregistered, the hub drops the queue sender, the write pump
//!   flushes what is left and sends a close frame
//! - the hub evicts the session (slow consumer): the queue closes, the write
//!   pump sends a close frame and exits, which stops the read pump
//! - a write or ping fails: the write pump exits, which stops the read pump

use std::future::Future;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use quickchat_config::RealtimeSettings;
use quickchat_hub::{Hub, SessionId};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::error::TransportError;
use crate::message::InboundEnvelope;
use crate::protocol;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub queue_capacity: usize,
    pub write_wait: Duration,
    pub pong_wait: Duration,
    pub ping_period: Duration,
}

impl From<&RealtimeSettings> for SessionOptions {
    fn from(settings: &RealtimeSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity,
            write_wait: settings.write_wait(),
            pong_wait: settings.pong_wait(),
            ping_period: settings.ping_period(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&quickchat_config::Settings::default().realtime)
    }
}

/// Register a session for an upgraded connection and run it to completion.
pub async fn run_session<S>(hub: Hub, ws: WebSocketStream<S>, options: SessionOptions)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (id, queue) = hub.register_session(options.queue_capacity);
    info!(session = %id, "session started");

    let (sink, stream) = ws.split();
    let (writer_done_tx, writer_done_rx) = oneshot::channel::<()>();

    let writer = {
        let options = options.clone();
        tokio::spawn(async move {
            let result = write_pump(sink, queue, &options).await;
            drop(writer_done_tx);
            result
        })
    };

    if let Err(e) = read_pump(&hub, id, stream, options.pong_wait, writer_done_rx).await {
        debug!(session = %id, error = %e, "read pump stopped");
    }
    hub.unregister_session(id);

    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(session = %id, error = %e, "write pump stopped"),
        Err(e) => warn!(session = %id, error = %e, "write pump task failed"),
    }
    info!(session = %id, "session closed");
}

/// Read frames until the peer goes away, the read deadline passes or the
/// write pump stops. Every received frame, pongs included, pushes the
/// deadline out by `pong_wait`.
pub(crate) async fn read_pump<St>(
    hub: &Hub,
    id: SessionId,
    mut stream: St,
    pong_wait: Duration,
    mut writer_done: oneshot::Receiver<()>,
) -> Result<(), TransportError>
where
    St: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    let mut deadline = Instant::now() + pong_wait;
    loop {
        let next = tokio::select! {
            _ = &mut writer_done => return Ok(()),
            next = time::timeout_at(deadline, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => return Err(TransportError::ReadTimeout),
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(Some(Ok(frame))) => frame,
        };
        deadline = Instant::now() + pong_wait;

        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<InboundEnvelope>(text.as_str()) {
                Ok(inbound) => protocol::dispatch(hub, id, inbound),
                Err(err) => {
                    warn!(
                        session = %id,
                        error = %err,
                        frame = %text.as_str().chars().take(100).collect::<String>(),
                        "ignoring undecodable envelope"
                    );
                }
            },
            WsMessage::Close(_) => return Ok(()),
            // Pings are answered by tungstenite itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) | WsMessage::Frame(_) => {}
        }
    }
}

/// Write queued frames and keepalive pings until the hub closes the queue
/// or a write fails.
pub(crate) async fn write_pump<Si>(
    mut sink: Si,
    mut queue: mpsc::Receiver<WsMessage>,
    options: &SessionOptions,
) -> Result<(), TransportError>
where
    Si: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let mut ticker = time::interval_at(Instant::now() + options.ping_period, options.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = queue.recv() => match frame {
                Some(frame) => write_batch(&mut sink, &mut queue, frame, options.write_wait).await?,
                None => {
                    // The hub closed the queue. Closing the sink sends the close frame.
                    return with_deadline(options.write_wait, sink.close()).await;
                }
            },
            _ = ticker.tick() => {
                with_deadline(options.write_wait, sink.send(WsMessage::Ping(Default::default()))).await?;
            }
        }
    }
}

/// Write `first` plus whatever was already queued behind it, then flush once.
async fn write_batch<Si>(
    sink: &mut Si,
    queue: &mut mpsc::Receiver<WsMessage>,
    first: WsMessage,
    write_wait: Duration,
) -> Result<(), TransportError>
where
    Si: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let queued = queue.len();
    with_deadline(write_wait, sink.feed(first)).await?;
    for _ in 0..queued {
        match queue.try_recv() {
            Ok(frame) => with_deadline(write_wait, sink.feed(frame)).await?,
            Err(_) => break,
        }
    }
    with_deadline(write_wait, sink.flush()).await
}

async fn with_deadline<F>(wait: Duration, write: F) -> Result<(), TransportError>
where
    F: Future<Output = Result<(), tungstenite::Error>>,
{
    match time::timeout(wait, write).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TransportError::WriteTimeout),
    }
}
