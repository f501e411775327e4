/// Client-level settings shared by every coordinator built from a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Identifier of this client, attached to persistence spans.
    pub client_id: String,
    /// Persistence calls slower than this are logged at `warn`.
    pub slow_persist_warn_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            slow_persist_warn_ms: 5_000,
        }
    }
}
