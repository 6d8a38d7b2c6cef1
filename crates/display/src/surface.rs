use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{SurfaceDimensions, SurfaceId},
    protocol::DisplayMessage,
};

use crate::SurfaceError;

/// Control-side handle to one presentation surface.
pub trait SurfaceHandle: Send + Sync {
    fn id(&self) -> SurfaceId;

    /// Liveness probe. An `Err` means the handle could not be inspected at all.
    fn is_closed(&self) -> Result<bool, SurfaceError>;

    /// Fire-and-forget delivery of one frame.
    fn post_message(&self, message: &DisplayMessage) -> Result<(), SurfaceError>;

    fn close(&self);

    /// Whether the surface announced `READY`. Content updates do not depend on it.
    fn is_ready(&self) -> bool {
        false
    }
}

/// Creates presentation surfaces. `None` means the host refused the launch.
#[async_trait]
pub trait SurfaceLauncher: Send + Sync {
    async fn launch(
        &self,
        url: &str,
        dimensions: SurfaceDimensions,
    ) -> Option<Arc<dyn SurfaceHandle>>;
}
