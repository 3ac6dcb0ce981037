use std::sync::Arc;

use crate::services::assistant_service::AssistantService;
use crate::services::conversation::SessionStore;
use crate::services::live_opportunities_service::LiveOpportunitiesService;

#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<AssistantService>,
    pub sessions: SessionStore,
    pub opportunities: Arc<LiveOpportunitiesService>,
}
