use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return millisecond
pub fn now_millis() -> u64 {
    let now = SystemTime::now();
    let since_epoch = now.duration_since(UNIX_EPOCH).expect("Time went backwards");
    since_epoch.as_millis() as u64
}

/// return second
pub fn now_secs() -> u64 {
    let now = SystemTime::now();
    let since_epoch = now.duration_since(UNIX_EPOCH).expect("Time went backwards");
    since_epoch.as_secs()
}
