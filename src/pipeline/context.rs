use uuid::Uuid;

/// Annotations carried by one logical request across its retries and replays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub id: Uuid,
    pub retry_count: u32,
    pub refresh_attempted: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            retry_count: 0,
            refresh_attempted: false,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
