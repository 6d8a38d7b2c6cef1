use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use display::{surface_link, SurfaceEndpoint, SurfaceHandle, SurfaceLauncher};
use shared::{
    domain::{SurfaceDimensions, SurfaceId},
    protocol::ServerEvent,
};
use tokio::{
    process::Command,
    sync::{broadcast, oneshot, Mutex},
};
use tracing::{debug, info, warn};
use url::Url;

struct PendingSurface {
    endpoint: SurfaceEndpoint,
    attached: oneshot::Sender<()>,
}

/// Launches presentation surfaces as websocket clients.
///
/// A launch parks one end of a surface link under a fresh id, announces the
/// attach url and optionally runs the configured launch command. It succeeds
/// once a client connects to `/display/ws?surface=<id>` within the timeout.
pub(crate) struct WsSurfaceLauncher {
    events: broadcast::Sender<ServerEvent>,
    launch_command: Option<String>,
    timeout: Duration,
    pending: Mutex<HashMap<SurfaceId, PendingSurface>>,
}

impl WsSurfaceLauncher {
    pub(crate) fn new(
        events: broadcast::Sender<ServerEvent>,
        launch_command: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            events,
            launch_command,
            timeout,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Hands the parked endpoint to an attaching client. `None` when the id is
    /// unknown or the launch already gave up waiting.
    pub(crate) async fn claim(&self, surface_id: SurfaceId) -> Option<SurfaceEndpoint> {
        let pending = self.pending.lock().await.remove(&surface_id)?;
        if pending.attached.send(()).is_err() {
            debug!(surface = %surface_id, "surface attached after its launch timed out");
            return None;
        }
        Some(pending.endpoint)
    }

    async fn abandon(&self, surface_id: SurfaceId) {
        self.pending.lock().await.remove(&surface_id);
    }
}

#[async_trait]
impl SurfaceLauncher for WsSurfaceLauncher {
    async fn launch(
        &self,
        url: &str,
        dimensions: SurfaceDimensions,
    ) -> Option<Arc<dyn SurfaceHandle>> {
        let surface_id = SurfaceId::new();
        let attach_url = match attach_url(url, surface_id) {
            Ok(attach_url) => attach_url,
            Err(error) => {
                warn!(url, %error, "cannot derive surface attach url");
                return None;
            }
        };

        let (handle, endpoint) = surface_link(surface_id);
        let (attached_tx, attached_rx) = oneshot::channel();
        self.pending.lock().await.insert(
            surface_id,
            PendingSurface {
                endpoint,
                attached: attached_tx,
            },
        );

        info!(surface = %surface_id, url = %attach_url, "waiting for presentation client");
        let _ = self.events.send(ServerEvent::DisplayLaunchRequested {
            surface_id,
            url: attach_url.to_string(),
            width: dimensions.width,
            height: dimensions.height,
        });

        if let Some(command) = &self.launch_command {
            if let Err(error) = spawn_launch_command(command, &attach_url, dimensions) {
                warn!(%command, %error, "display launch command failed");
                self.abandon(surface_id).await;
                return None;
            }
        }

        match tokio::time::timeout(self.timeout, attached_rx).await {
            Ok(Ok(())) => Some(Arc::new(handle)),
            _ => {
                warn!(surface = %surface_id, timeout = ?self.timeout, "no presentation client attached");
                self.abandon(surface_id).await;
                None
            }
        }
    }
}

/// `http(s)://host/display` becomes `ws(s)://host/display/ws?surface=<id>`.
fn attach_url(display_url: &str, surface_id: SurfaceId) -> anyhow::Result<Url> {
    let mut url = Url::parse(display_url)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|()| anyhow::anyhow!("cannot use a websocket scheme for '{display_url}'"))?;
    url.path_segments_mut()
        .map_err(|()| anyhow::anyhow!("'{display_url}' cannot carry a path"))?
        .pop_if_empty()
        .push("ws");
    url.query_pairs_mut()
        .clear()
        .append_pair("surface", &surface_id.to_string());
    Ok(url)
}

fn spawn_launch_command(
    command: &str,
    attach_url: &Url,
    dimensions: SurfaceDimensions,
) -> std::io::Result<()> {
    let mut args = command.split_whitespace().map(|arg| {
        arg.replace("{url}", attach_url.as_str())
            .replace("{width}", &dimensions.width.to_string())
            .replace("{height}", &dimensions.height.to_string())
    });
    let program = args.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty launch command")
    })?;

    let mut child = Command::new(&program).args(args).spawn()?;
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => info!(%program, %status, "display launch command exited"),
            Err(error) => warn!(%program, %error, "failed to wait for display launch command"),
        }
    });
    Ok(())
}

#[cfg(test)]
#[path = "tests/surface_tests.rs"]
mod tests;
