use std::sync::Arc;

use server_api::ApiContext;
use shared::protocol::ServerEvent;
use tokio::sync::broadcast;

use crate::surface::WsSurfaceLauncher;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) events: broadcast::Sender<ServerEvent>,
    pub(crate) launcher: Arc<WsSurfaceLauncher>,
}
