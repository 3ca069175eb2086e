use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::Arc;

use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::http::StatusCode;
use warp::ws::Message;
use warp::ws::WebSocket;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use super::ClientFrame;
use super::ServerFrame;
use super::SharedConnectionManager;
use super::TokenValidator;
use crate::constants::CLOSE_CODE_AUTH_FAILURE;
use crate::constants::CLOSE_CODE_ZOMBIE;
use crate::utils::time;
use crate::AttributeMap;
use crate::BridgeAdapter;
use crate::Error;
use crate::NetworkConfig;
use crate::ShadowError;
use crate::StorageError;
use crate::SystemError;

/// Body of the reported/desired write endpoints.
#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub attributes: AttributeMap,

    /// "Apply only if the shadow is still at this version"
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub device_id: String,
    pub version: u64,
    pub updated_at: u64,

    /// Keys the write actually changed, with their accepted values
    pub attributes: AttributeMap,

    /// Pending set after reconciliation
    pub pending: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Reported,
    Desired,
}

/// Builds the full HTTP + WebSocket route tree.
pub fn routes(
    bridge: Arc<BridgeAdapter>,
    manager: SharedConnectionManager,
    validator: Arc<dyn TokenValidator>,
    config: NetworkConfig,
    shutdown_signal: watch::Receiver<()>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let get_shadow = warp::path!("v1" / "devices" / String / "shadow")
        .and(warp::get())
        .and(with_bridge(bridge.clone()))
        .and_then(get_shadow_handler);

    let post_reported = warp::path!("v1" / "devices" / String / "reported")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_bridge(bridge.clone()))
        .and_then(|device_id, request, bridge| {
            write_handler(device_id, request, bridge, WriteKind::Reported)
        });

    let post_desired = warp::path!("v1" / "devices" / String / "desired")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_bridge(bridge.clone()))
        .and_then(|device_id, request, bridge| {
            write_handler(device_id, request, bridge, WriteKind::Desired)
        });

    let stream = warp::path!("v1" / "stream")
        .and(warp::ws())
        .and(warp::query::<StreamQuery>())
        .map(move |ws: warp::ws::Ws, query: StreamQuery| {
            let authorized = validator.validate(query.token.as_deref());
            let manager = manager.clone();
            let config = config.clone();
            let shutdown_signal = shutdown_signal.clone();
            ws.on_upgrade(move |socket| {
                handle_connection(socket, authorized, manager, config, shutdown_signal)
            })
        });

    get_shadow.or(post_reported).or(post_desired).or(stream)
}

fn with_bridge(
    bridge: Arc<BridgeAdapter>
) -> impl Filter<Extract = (Arc<BridgeAdapter>,), Error = Infallible> + Clone {
    warp::any().map(move || bridge.clone())
}

async fn get_shadow_handler(
    device_id: String,
    bridge: Arc<BridgeAdapter>,
) -> Result<impl Reply, Infallible> {
    match bridge.fetch(&device_id) {
        Ok(Some(document)) => Ok(warp::reply::with_status(
            warp::reply::json(&document),
            StatusCode::OK,
        )),
        Ok(None) => Ok(warp::reply::with_status(
            warp::reply::json(&ErrorBody {
                error: format!("no shadow for device {device_id}"),
            }),
            StatusCode::NOT_FOUND,
        )),
        Err(e) => {
            error!("shadow read for {} failed: {:?}", device_id, e);
            Ok(error_reply(&e))
        }
    }
}

async fn write_handler(
    device_id: String,
    request: WriteRequest,
    bridge: Arc<BridgeAdapter>,
    kind: WriteKind,
) -> Result<impl Reply, Infallible> {
    let result = match kind {
        WriteKind::Reported => {
            bridge
                .apply_reported(&device_id, request.attributes, request.expected_version)
                .await
        }
        WriteKind::Desired => {
            bridge
                .apply_desired(&device_id, request.attributes, request.expected_version)
                .await
        }
    };

    match result {
        Ok(outcome) => {
            let attributes = outcome
                .event
                .reported_delta
                .or(outcome.event.desired_delta)
                .unwrap_or_default();
            Ok(warp::reply::with_status(
                warp::reply::json(&WriteResponse {
                    device_id,
                    version: outcome.document.version,
                    updated_at: outcome.document.updated_at,
                    attributes,
                    pending: outcome.document.pending,
                }),
                StatusCode::OK,
            ))
        }
        Err(e) => {
            debug!("write to {} rejected: {:?}", device_id, e);
            Ok(error_reply(&e))
        }
    }
}

fn error_reply(error: &Error) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&ErrorBody {
            error: error.to_string(),
        }),
        status_of(error),
    )
}

fn status_of(error: &Error) -> StatusCode {
    match error {
        Error::Shadow(ShadowError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Shadow(ShadowError::Conflict(_)) => StatusCode::CONFLICT,
        Error::Shadow(ShadowError::DeviceUnknown { .. }) => StatusCode::NOT_FOUND,
        Error::System(SystemError::Storage(StorageError::Unavailable(_))) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Drives one subscriber socket until close, zombie deadline or shutdown.
async fn handle_connection(
    socket: WebSocket,
    authorized: bool,
    manager: SharedConnectionManager,
    config: NetworkConfig,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    if !authorized {
        warn!("stream upgrade with invalid credential");
        let _ = ws_tx
            .send(Message::close_with(
                CLOSE_CODE_AUTH_FAILURE,
                "authentication failed",
            ))
            .await;
        let _ = ws_tx.close().await;
        return;
    }

    let (connection_id, mut outbound) = manager.register();
    manager.mark_open(&connection_id);

    let mut heartbeat = tokio::time::interval(config.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so a fresh connection is
    // not probed before it ever spoke.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            maybe_frame = outbound.recv() => match maybe_frame {
                Some(frame) => {
                    if send_frame(&mut ws_tx, &frame).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            maybe_message = ws_rx.next() => match maybe_message {
                Some(Ok(message)) => {
                    manager.record_activity(&connection_id);
                    if message.is_close() {
                        debug!("connection {} closed by peer", connection_id);
                        break;
                    }
                    if let Ok(text) = message.to_str() {
                        handle_text(&connection_id, text, &manager, &mut ws_tx).await;
                    }
                }
                Some(Err(e)) => {
                    debug!("connection {} transport error: {}", connection_id, e);
                    break;
                }
                None => break,
            },
            _ = heartbeat.tick() => {
                if manager
                    .zombie_candidates()
                    .iter()
                    .any(|id| id == &connection_id)
                {
                    info!("connection {} went silent, force-closing", connection_id);
                    let _ = ws_tx
                        .send(Message::close_with(CLOSE_CODE_ZOMBIE, "no activity"))
                        .await;
                    break;
                }

                // An idle subscriber has nothing to say on its own; the
                // transport pong to this ping is what keeps it alive.
                if ws_tx.send(Message::ping("")).await.is_err() {
                    break;
                }

                for device_id in manager.take_stale_devices(&connection_id) {
                    let resync = ServerFrame::Resync { device_id };
                    if send_frame(&mut ws_tx, &resync).await.is_err() {
                        break;
                    }
                }

                let heartbeat_frame = ServerFrame::Heartbeat {
                    timestamp: time::now_millis(),
                };
                if send_frame(&mut ws_tx, &heartbeat_frame).await.is_err() {
                    break;
                }
            },
            _ = shutdown_signal.changed() => {
                debug!("connection {} closing for shutdown", connection_id);
                let _ = ws_tx.send(Message::close()).await;
                break;
            }
        }
    }

    manager.teardown(&connection_id);
    let _ = ws_tx.close().await;
}

async fn handle_text(
    connection_id: &str,
    text: &str,
    manager: &SharedConnectionManager,
    ws_tx: &mut (impl SinkExt<Message> + Unpin),
) {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => manager.handle_control(connection_id, frame),
        Err(e) => {
            debug!("connection {} sent malformed frame: {}", connection_id, e);
            let reply = ServerFrame::Error {
                message: format!("malformed control frame: {e}"),
            };
            if let Ok(json) = serde_json::to_string(&reply) {
                let _ = ws_tx.send(Message::text(json)).await;
            }
        }
    }
}

async fn send_frame(
    ws_tx: &mut (impl SinkExt<Message> + Unpin),
    frame: &ServerFrame,
) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    ws_tx.send(Message::text(json)).await.map_err(|_| ())
}
