use std::sync::Arc;

use crate::auth::AuthKeys;
use crate::hub::HubHandle;
use crate::ingest::IngestStats;
use crate::publisher::CommandPublisher;
use crate::rate_limit::RateLimiter;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub publisher: Arc<CommandPublisher>,
    pub store: Arc<dyn Store>,
    pub auth: AuthKeys,
    pub rate_limiter: Arc<RateLimiter>,
    pub ingest_stats: Arc<IngestStats>,
}
