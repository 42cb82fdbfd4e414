use crate::dto::HealthRes;

/// Simple health service shared by the server and its clients.
///
/// Reports liveness together with an explicit storage connectivity flag, so callers never
/// have to infer offline mode from failed requests.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Builds the health response for the given storage state.
    pub fn check_health(storage_reachable: bool) -> HealthRes {
        let message = if storage_reachable {
            "chat service is alive"
        } else {
            "chat service is alive, storage unreachable"
        };
        HealthRes {
            ok: true,
            message: message.into(),
            storage_reachable,
        }
    }
}
