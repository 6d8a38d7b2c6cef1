use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use shared::{
    domain::{SurfaceDimensions, SurfaceId},
    protocol::DisplayMessage,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{DisplayError, SurfaceHandle, SurfaceLauncher};

#[derive(Debug, Clone)]
pub struct DisplayOptions {
    pub url: String,
    pub dimensions: SurfaceDimensions,
    pub poll_interval: Duration,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            url: "/display".into(),
            dimensions: SurfaceDimensions::default(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
struct Session {
    handle: Option<Arc<dyn SurfaceHandle>>,
    poller: Option<JoinHandle<()>>,
}

impl Session {
    fn live_handle(&self) -> Option<Arc<dyn SurfaceHandle>> {
        let handle = self.handle.as_ref()?;
        probe(handle.as_ref()).then(|| Arc::clone(handle))
    }

    fn clear(&mut self) -> Option<Arc<dyn SurfaceHandle>> {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.handle.take()
    }
}

/// The one display session of a control surface.
///
/// Owns at most one presentation surface at a time. Expected failures come
/// back as [`DisplayError`] values; nothing here panics because the remote
/// side disappeared.
pub struct DisplayChannel {
    launcher: Arc<dyn SurfaceLauncher>,
    options: DisplayOptions,
    session: Arc<Mutex<Session>>,
    opening: Mutex<()>,
    status: Arc<watch::Sender<bool>>,
}

impl DisplayChannel {
    pub fn new(launcher: Arc<dyn SurfaceLauncher>, options: DisplayOptions) -> Self {
        let (status, _) = watch::channel(false);
        Self {
            launcher,
            options,
            session: Arc::new(Mutex::new(Session::default())),
            opening: Mutex::new(()),
            status: Arc::new(status),
        }
    }

    pub fn options(&self) -> &DisplayOptions {
        &self.options
    }

    /// Returns the live surface, launching one if there is none.
    ///
    /// Concurrent opens queue behind one another; the session itself is not
    /// held while the launcher waits, so `send` and friends keep answering.
    pub async fn open(&self) -> Result<Arc<dyn SurfaceHandle>, DisplayError> {
        let _opening = self.opening.lock().await;
        {
            let mut session = self.session.lock().await;
            if let Some(handle) = session.live_handle() {
                debug!(surface = %handle.id(), "presentation surface already open");
                return Ok(handle);
            }
            session.clear();
        }

        info!(url = %self.options.url, width = self.options.dimensions.width, height = self.options.dimensions.height, "launching presentation surface");
        let Some(handle) = self
            .launcher
            .launch(&self.options.url, self.options.dimensions)
            .await
        else {
            warn!(url = %self.options.url, "presentation surface launch refused");
            publish(&self.status, false);
            return Err(DisplayError::PopupBlocked);
        };

        let mut session = self.session.lock().await;
        if let Some(current) = session.live_handle() {
            debug!(surface = %handle.id(), kept = %current.id(), "discarding surface that lost the open race");
            handle.close();
            return Ok(current);
        }
        session.clear();
        session.handle = Some(Arc::clone(&handle));
        session.poller = Some(self.spawn_poller(handle.id()));
        publish(&self.status, true);
        info!(surface = %handle.id(), "presentation surface open");
        Ok(handle)
    }

    /// Closes the surface if it is still there. Always leaves no handle behind.
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        if let Some(handle) = session.clear() {
            if probe(handle.as_ref()) {
                handle.close();
                info!(surface = %handle.id(), "presentation surface closed");
            }
        }
        publish(&self.status, false);
    }

    pub async fn is_open(&self) -> bool {
        let mut session = self.session.lock().await;
        self.refresh(&mut session).is_some()
    }

    pub async fn is_ready(&self) -> bool {
        let mut session = self.session.lock().await;
        self.refresh(&mut session)
            .is_some_and(|handle| handle.is_ready())
    }

    /// Pushes one content update. Liveness is checked right here, independent
    /// of the poller.
    pub async fn send(&self, content: &str) -> Result<(), DisplayError> {
        let handle = {
            let mut session = self.session.lock().await;
            self.refresh(&mut session).ok_or(DisplayError::NotOpen)?
        };

        handle
            .post_message(&DisplayMessage::content(content))
            .map_err(|error| {
                warn!(surface = %handle.id(), %error, "failed to deliver display content");
                DisplayError::TransportFailure(error.to_string())
            })
    }

    /// Liveness indicator for the operator UI.
    pub fn subscribe_status(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }

    fn refresh(&self, session: &mut Session) -> Option<Arc<dyn SurfaceHandle>> {
        if let Some(handle) = session.live_handle() {
            return Some(handle);
        }
        if let Some(handle) = session.clear() {
            info!(surface = %handle.id(), "presentation surface is gone");
        }
        publish(&self.status, false);
        None
    }

    fn spawn_poller(&self, surface: SurfaceId) -> JoinHandle<()> {
        let session = Arc::downgrade(&self.session);
        let status = Arc::clone(&self.status);
        let period = self.options.poll_interval;
        tokio::spawn(poll_liveness(session, status, surface, period))
    }
}

impl Drop for DisplayChannel {
    fn drop(&mut self) {
        let Ok(mut session) = self.session.try_lock() else {
            debug!("display session busy at drop; surface teardown skipped");
            return;
        };
        if let Some(handle) = session.clear() {
            handle.close();
        }
    }
}

async fn poll_liveness(
    session: Weak<Mutex<Session>>,
    status: Arc<watch::Sender<bool>>,
    surface: SurfaceId,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(session) = session.upgrade() else {
            return;
        };
        let mut session = session.lock().await;
        let current = session
            .handle
            .as_ref()
            .is_some_and(|handle| handle.id() == surface);
        if !current {
            return;
        }
        if session.live_handle().is_some() {
            continue;
        }

        session.handle.take();
        // Dropping our own join handle detaches instead of aborting.
        session.poller.take();
        info!(%surface, "presentation surface closed remotely");
        publish(&status, false);
        return;
    }
}

fn probe(handle: &dyn SurfaceHandle) -> bool {
    match handle.is_closed() {
        Ok(closed) => !closed,
        Err(error) => {
            debug!(surface = %handle.id(), %error, "surface liveness probe failed");
            false
        }
    }
}

fn publish(status: &watch::Sender<bool>, open: bool) {
    status.send_if_modified(|current| {
        let changed = *current != open;
        *current = open;
        changed
    });
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
