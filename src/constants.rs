// -
// Database namespaces

/// Sled database tree namespaces
pub(crate) const SHADOW_TREE: &str = "_shadow_tree";

/// Sled directory name under the storage root
pub(crate) const SHADOW_DB_DIR: &str = "shadow_store";

// -
// WebSocket close codes (application range 4000-4999)

/// Sent when the bearer credential is missing or invalid. Clients must
/// treat this code as fatal and suppress auto-reconnect.
pub const CLOSE_CODE_AUTH_FAILURE: u16 = 4401;

/// Sent when the peer went silent past the zombie deadline.
pub const CLOSE_CODE_ZOMBIE: u16 = 4408;

// -
// Protocol defaults

/// Heartbeat interval if configuration does not override it (milliseconds).
pub(crate) const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;

/// Per-connection outbound buffer depth before events give way to a resync.
pub(crate) const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Number of notifier shards if configuration does not override it.
pub(crate) const DEFAULT_NOTIFIER_SHARDS: usize = 8;

/// Per-shard channel depth between the reconciler and the dispatch loops.
pub(crate) const DEFAULT_SHARD_BUFFER: usize = 1024;
