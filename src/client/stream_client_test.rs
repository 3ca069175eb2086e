use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::routes;
use crate::AllowAllRegistry;
use crate::AttributeMap;
use crate::AttributeValidator;
use crate::AttributeValue;
use crate::BackoffPolicy;
use crate::BridgeAdapter;
use crate::ChangeNotifier;
use crate::ConnectionManager;
use crate::MemoryShadowStore;
use crate::NetworkConfig;
use crate::Reconciler;
use crate::ShadowStreamClient;
use crate::StaticTokenValidator;
use crate::StreamUpdate;
use crate::UnknownDevicePolicy;
use crate::ValidationConfig;

struct TestServer {
    addr: SocketAddr,
    bridge: Arc<BridgeAdapter>,
    _shutdown_tx: watch::Sender<()>,
}

fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 2,
        timeout_ms: 100,
        base_delay_ms: 10,
        max_delay_ms: 50,
    }
}

async fn start_server(auth_token: Option<String>) -> TestServer {
    let config = NetworkConfig {
        auth_token: auth_token.clone(),
        ..NetworkConfig::default()
    };
    let store = Arc::new(MemoryShadowStore::new());
    let manager = Arc::new(ConnectionManager::new(&config));
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let notifier = ChangeNotifier::spawn(2, 64, manager.clone(), shutdown_rx.clone());
    let reconciler = Arc::new(Reconciler::new(
        store,
        notifier,
        Arc::new(AttributeValidator::new(ValidationConfig::default())),
        fast_backoff(),
    ));
    let bridge = Arc::new(BridgeAdapter::new(
        reconciler,
        Arc::new(AllowAllRegistry),
        UnknownDevicePolicy::AcceptAndCreate,
        fast_backoff(),
    ));

    let filter = routes(
        bridge.clone(),
        manager,
        Arc::new(StaticTokenValidator::new(auth_token)),
        config,
        shutdown_rx,
    );
    let (addr, server) = warp::serve(filter).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    TestServer {
        addr,
        bridge,
        _shutdown_tx: shutdown_tx,
    }
}

fn stream_url(addr: SocketAddr) -> Url {
    Url::parse(&format!("ws://{addr}/v1/stream")).unwrap()
}

fn number_delta(name: &str, value: f64) -> AttributeMap {
    let mut delta = AttributeMap::new();
    delta.insert(name.to_string(), AttributeValue::Number(value));
    delta
}

#[tokio::test]
async fn test_client_receives_subscribed_events() {
    let server = start_server(None).await;
    let cancel = CancellationToken::new();

    let client = ShadowStreamClient::connect(
        stream_url(server.addr),
        None,
        fast_backoff(),
        cancel.clone(),
    )
    .unwrap();
    let mut updates = client.updates();

    client.subscribe("thermostat-1").unwrap();
    // Let the subscription reach the server before writing
    tokio::time::sleep(Duration::from_millis(200)).await;

    server
        .bridge
        .apply_reported("thermostat-1", number_delta("temperature", 21.5), None)
        .await
        .unwrap();

    let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .expect("update within deadline")
        .expect("stream alive");
    match update.as_ref() {
        StreamUpdate::Event(event) => {
            assert_eq!(event.device_id, "thermostat-1");
            assert_eq!(event.version, 1);
            assert_eq!(
                event.reported_delta.as_ref().unwrap().get("temperature"),
                Some(&AttributeValue::Number(21.5))
            );
        }
        other => panic!("unexpected update: {other:?}"),
    }

    cancel.cancel();
}

#[tokio::test]
async fn test_unsubscribed_devices_stay_silent() {
    let server = start_server(None).await;
    let cancel = CancellationToken::new();

    let client = ShadowStreamClient::connect(
        stream_url(server.addr),
        None,
        fast_backoff(),
        cancel.clone(),
    )
    .unwrap();
    let mut updates = client.updates();

    client.subscribe("thermostat-1").unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    server
        .bridge
        .apply_reported("other-device", number_delta("temperature", 30.0), None)
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_millis(500), updates.recv()).await;
    assert!(result.is_err(), "no update expected for other devices");

    cancel.cancel();
}

#[tokio::test]
async fn test_auth_rejection_stops_the_client() {
    let server = start_server(Some("s3cret".to_string())).await;
    let cancel = CancellationToken::new();

    let client = ShadowStreamClient::connect(
        stream_url(server.addr),
        Some("wrong"),
        fast_backoff(),
        cancel.clone(),
    )
    .unwrap();
    let mut updates = client.updates();

    // The server closes with the auth-failure code; the client must give
    // up instead of reconnecting, which drops the update channel.
    let result = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .expect("client gives up within deadline");
    assert!(matches!(result, Err(RecvError::Closed)));
}
