use std::collections::HashMap;

use heartwatch_service::Engine;

/// Shared by every worker
pub struct AppState {
    pub engine: Engine,
    /// Bearer token to user id
    pub tokens: HashMap<String, i64>,
}
