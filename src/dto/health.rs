use serde::Serialize;
use utoipa::ToSchema;

/// Payload of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// Whether a session store is installed and answered its last ping.
    pub storage_reachable: bool,
}

impl HealthResponse {
    /// Build the payload from the degraded flag and the outcome of the storage ping.
    pub fn new(degraded: bool, storage_reachable: bool) -> Self {
        let status = if degraded || !storage_reachable {
            "degraded"
        } else {
            "ok"
        };
        Self {
            status: status.to_owned(),
            storage_reachable,
        }
    }
}
