use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use shared::domain::{SurfaceDimensions, SurfaceId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{surface_link, SurfaceEndpoint, SurfaceHandle, SurfaceLauncher};

/// A surface created by [`LocalSurfaceLauncher`], as seen by its host.
pub struct LaunchedSurface {
    pub url: String,
    pub dimensions: SurfaceDimensions,
    pub endpoint: SurfaceEndpoint,
}

/// Launches surfaces inside the current process and hands their endpoints to
/// whoever holds the paired receiver. Dropping that receiver, or blocking the
/// launcher, makes every later launch a refusal.
pub struct LocalSurfaceLauncher {
    surfaces: mpsc::UnboundedSender<LaunchedSurface>,
    blocked: AtomicBool,
    launches: AtomicUsize,
}

impl LocalSurfaceLauncher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LaunchedSurface>) {
        let (surfaces, host) = mpsc::unbounded_channel();
        (
            Self {
                surfaces,
                blocked: AtomicBool::new(false),
                launches: AtomicUsize::new(0),
            },
            host,
        )
    }

    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SurfaceLauncher for LocalSurfaceLauncher {
    async fn launch(
        &self,
        url: &str,
        dimensions: SurfaceDimensions,
    ) -> Option<Arc<dyn SurfaceHandle>> {
        if self.blocked.load(Ordering::SeqCst) {
            debug!(url, "local surface launch blocked");
            return None;
        }
        let (handle, endpoint) = surface_link(SurfaceId::new());
        self.surfaces
            .send(LaunchedSurface {
                url: url.to_string(),
                dimensions,
                endpoint,
            })
            .ok()?;
        self.launches.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(handle))
    }
}
