use std::collections::BTreeSet;
use std::sync::Arc;

use futures::SinkExt;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::ClientRequestBuilder;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;
use url::Url;

use crate::constants::CLOSE_CODE_AUTH_FAILURE;
use crate::BackoffPolicy;
use crate::ChangeEvent;
use crate::ClientFrame;
use crate::NetworkError;
use crate::Result;
use crate::ServerFrame;

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// What the stream surfaces to the embedding application.
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    /// An ordered shadow change on a subscribed device
    Event(ChangeEvent),

    /// The server abandoned buffered events for this device; re-fetch the
    /// full document before applying further events
    Resync { device_id: String },
}

/// How one connection session ended, deciding the reconnect behavior.
enum SessionEnd {
    /// Clean close or stream end; reconnect immediately
    Reconnect,

    /// The server refused the credential; retrying would loop forever
    AuthRejected,
}

/// Reconnecting WebSocket consumer of the change stream.
///
/// Tracks the wanted subscription set locally and replays it after every
/// reconnect, so the application subscribes once and survives server
/// restarts. An auth-failure close is fatal and stops the client.
pub struct ShadowStreamClient {
    update_rx: broadcast::Receiver<Arc<StreamUpdate>>,
    control_tx: mpsc::UnboundedSender<ClientFrame>,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
    cancel: CancellationToken,
}

impl ShadowStreamClient {
    /// Spawns the reconnection loop. Returns immediately; the first
    /// connection attempt happens asynchronously.
    pub fn connect(
        stream_url: Url,
        token: Option<&str>,
        reconnect: BackoffPolicy,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let mut url = stream_url;
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }

        let (update_tx, update_rx) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(Mutex::new(BTreeSet::new()));

        let task_cancel = cancel.clone();
        let task_subscriptions = subscriptions.clone();
        tokio::spawn(async move {
            ws_loop(
                url,
                update_tx,
                control_rx,
                task_subscriptions,
                reconnect,
                task_cancel,
            )
            .await;
        });

        Ok(Self {
            update_rx,
            control_tx,
            subscriptions,
            cancel,
        })
    }

    /// New receiver for the update stream. A lagging consumer observes
    /// `RecvError::Lagged` and should resync the devices it cares about.
    pub fn updates(&self) -> broadcast::Receiver<Arc<StreamUpdate>> {
        self.update_rx.resubscribe()
    }

    /// Adds the device to the wanted set and tells the server, now and
    /// after every future reconnect.
    pub fn subscribe(
        &self,
        device_id: &str,
    ) -> Result<()> {
        self.subscriptions.lock().insert(device_id.to_string());
        self.send_control(ClientFrame::Subscribe {
            device_id: device_id.to_string(),
        })
    }

    pub fn unsubscribe(
        &self,
        device_id: &str,
    ) -> Result<()> {
        self.subscriptions.lock().remove(device_id);
        self.send_control(ClientFrame::Unsubscribe {
            device_id: device_id.to_string(),
        })
    }

    /// Signals the background task to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn send_control(
        &self,
        frame: ClientFrame,
    ) -> Result<()> {
        self.control_tx
            .send(frame)
            .map_err(|_| NetworkError::WebSocket("stream task stopped".to_string()).into())
    }
}

/// Main loop: connect, read until the session ends, back off, reconnect.
async fn ws_loop(
    url: Url,
    update_tx: broadcast::Sender<Arc<StreamUpdate>>,
    mut control_rx: mpsc::UnboundedReceiver<ClientFrame>,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
    reconnect: BackoffPolicy,
    cancel: CancellationToken,
) {
    let mut attempt = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = run_session(&url, &update_tx, &mut control_rx, &subscriptions, &cancel) => {
                match result {
                    Ok(SessionEnd::Reconnect) => {
                        info!("stream disconnected cleanly, reconnecting");
                        attempt = 0;
                        // A server that closes every session immediately must
                        // not be redialed in a hot loop; wait out at least the
                        // base delay.
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(reconnect.delay(0)) => {}
                        }
                    }
                    Ok(SessionEnd::AuthRejected) => {
                        error!("server rejected the stream credential, giving up");
                        break;
                    }
                    Err(e) => {
                        warn!("stream session failed (attempt {}): {:?}", attempt, e);
                        if attempt >= reconnect.max_retries {
                            error!(
                                "stream reconnect limit of {} reached, giving up",
                                reconnect.max_retries
                            );
                            break;
                        }

                        let delay = reconnect.delay_with_jitter(attempt);
                        debug!("waiting {:?} before reconnect", delay);
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
    debug!("stream client loop exiting");
}

/// One connection lifecycle: dial, replay subscriptions, pump frames.
async fn run_session(
    url: &Url,
    update_tx: &broadcast::Sender<Arc<StreamUpdate>>,
    control_rx: &mut mpsc::UnboundedReceiver<ClientFrame>,
    subscriptions: &Mutex<BTreeSet<String>>,
    cancel: &CancellationToken,
) -> Result<SessionEnd> {
    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| NetworkError::InvalidURI(e.to_string()))?;
    let request = ClientRequestBuilder::new(uri);

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| NetworkError::WebSocket(e.to_string()))?;
    info!("stream connected to {}", url);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // Replay the wanted set so a reconnect is invisible to the application.
    // Events may have been missed while disconnected, so each replayed
    // device also gets a resync notification telling the consumer to
    // re-fetch the full document before trusting the stream again.
    let wanted: Vec<String> = subscriptions.lock().iter().cloned().collect();
    for device_id in wanted {
        send_frame(
            &mut ws_tx,
            &ClientFrame::Subscribe {
                device_id: device_id.clone(),
            },
        )
        .await?;
        let _ = update_tx.send(Arc::new(StreamUpdate::Resync { device_id }));
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SessionEnd::Reconnect),
            maybe_frame = control_rx.recv() => {
                if let Some(frame) = maybe_frame {
                    send_frame(&mut ws_tx, &frame).await?;
                }
            }
            message = ws_rx.next() => match message {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    handle_server_frame(text.as_str(), update_tx);
                }
                Some(Ok(tungstenite::Message::Ping(_))) => {
                    // tungstenite answers pings automatically
                    trace!("stream ping");
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        info!("stream closed by server: {} {}", cf.code, cf.reason);
                        if u16::from(cf.code) == CLOSE_CODE_AUTH_FAILURE {
                            return Ok(SessionEnd::AuthRejected);
                        }
                    }
                    return Ok(SessionEnd::Reconnect);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(NetworkError::WebSocket(e.to_string()).into());
                }
                None => {
                    info!("stream ended without a close frame");
                    return Ok(SessionEnd::Reconnect);
                }
            }
        }
    }
}

fn handle_server_frame(
    text: &str,
    update_tx: &broadcast::Sender<Arc<StreamUpdate>>,
) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("unparseable server frame: {}", e);
            return;
        }
    };

    let update = match frame {
        ServerFrame::Event { event } => StreamUpdate::Event(event),
        ServerFrame::Resync { device_id } => StreamUpdate::Resync { device_id },
        ServerFrame::Heartbeat { .. } => {
            trace!("stream heartbeat");
            return;
        }
        ServerFrame::Error { message } => {
            warn!("server error frame: {}", message);
            return;
        }
    };

    // A send error only means no one is listening right now
    let _ = update_tx.send(Arc::new(update));
}

async fn send_frame<S>(
    ws_tx: &mut S,
    frame: &ClientFrame,
) -> Result<()>
where
    S: SinkExt<tungstenite::Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(frame)?;
    ws_tx
        .send(tungstenite::Message::text(json))
        .await
        .map_err(|e| NetworkError::WebSocket(e.to_string()).into())
}
