use tracing::warn;

/// Connection-time credential check. Runs once per WebSocket upgrade,
/// before any subscription state is created.
pub trait TokenValidator: Send + Sync + 'static {
    fn validate(
        &self,
        token: Option<&str>,
    ) -> bool;
}

/// Shared-secret validator backed by the configured bearer token.
/// A deployment without a configured token accepts every connection.
pub struct StaticTokenValidator {
    expected: Option<String>,
}

impl StaticTokenValidator {
    pub fn new(expected: Option<String>) -> Self {
        Self { expected }
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate(
        &self,
        token: Option<&str>,
    ) -> bool {
        match (&self.expected, token) {
            (None, _) => true,
            (Some(expected), Some(presented)) => expected == presented,
            (Some(_), None) => {
                warn!("connection attempt without credential");
                false
            }
        }
    }
}
