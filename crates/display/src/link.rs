use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use shared::{domain::SurfaceId, protocol::DisplayMessage};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::{DisplayReceiver, ListenerGuard, SurfaceError, SurfaceHandle};

/// Creates both ends of a surface connection. Frames are JSON text, the same
/// bytes that cross a window or socket boundary.
pub fn surface_link(id: SurfaceId) -> (ChannelSurfaceHandle, SurfaceEndpoint) {
    let (to_surface, from_controller) = mpsc::unbounded_channel();
    let (to_controller, from_surface) = mpsc::unbounded_channel();
    (
        ChannelSurfaceHandle {
            id,
            outbound: Mutex::new(Some(to_surface)),
            inbound: Mutex::new(from_surface),
            ready: AtomicBool::new(false),
        },
        SurfaceEndpoint {
            id,
            inbound: from_controller,
            outbound: to_controller,
        },
    )
}

pub struct ChannelSurfaceHandle {
    id: SurfaceId,
    outbound: Mutex<Option<UnboundedSender<String>>>,
    inbound: Mutex<UnboundedReceiver<String>>,
    ready: AtomicBool,
}

impl ChannelSurfaceHandle {
    fn drain_inbound(&self) {
        let Ok(mut inbound) = self.inbound.lock() else {
            return;
        };
        while let Ok(frame) = inbound.try_recv() {
            match DisplayMessage::from_frame(&frame) {
                Some(DisplayMessage::Ready) => {
                    debug!(surface = %self.id, "presentation surface ready");
                    self.ready.store(true, Ordering::Release);
                }
                _ => debug!(surface = %self.id, "ignoring unexpected frame from surface"),
            }
        }
    }
}

impl SurfaceHandle for ChannelSurfaceHandle {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn is_closed(&self) -> Result<bool, SurfaceError> {
        let outbound = self.outbound.lock().map_err(|_| SurfaceError::Poisoned)?;
        Ok(outbound.as_ref().map_or(true, UnboundedSender::is_closed))
    }

    fn post_message(&self, message: &DisplayMessage) -> Result<(), SurfaceError> {
        let frame = message.to_frame()?;
        let outbound = self.outbound.lock().map_err(|_| SurfaceError::Poisoned)?;
        let sender = outbound.as_ref().ok_or(SurfaceError::Closed)?;
        sender.send(frame).map_err(|_| SurfaceError::Closed)
    }

    fn close(&self) {
        if let Ok(mut outbound) = self.outbound.lock() {
            outbound.take();
        }
    }

    fn is_ready(&self) -> bool {
        self.drain_inbound();
        self.ready.load(Ordering::Acquire)
    }
}

/// Presentation-side end of a [`surface_link`]. Dropping it is how a surface
/// goes away.
pub struct SurfaceEndpoint {
    id: SurfaceId,
    inbound: UnboundedReceiver<String>,
    outbound: UnboundedSender<String>,
}

impl SurfaceEndpoint {
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// Next frame from the controller, `None` once the controller closed us.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    pub fn send_frame(&self, frame: String) -> bool {
        self.outbound.send(frame).is_ok()
    }

    pub fn announce_ready(&self) -> bool {
        DisplayMessage::Ready
            .to_frame()
            .map(|frame| self.send_frame(frame))
            .unwrap_or(false)
    }

    pub fn into_parts(self) -> (UnboundedReceiver<String>, UnboundedSender<String>) {
        (self.inbound, self.outbound)
    }

    pub fn listen(self, receiver: DisplayReceiver) -> ListenerGuard {
        receiver.listen(self.inbound, Some(self.outbound))
    }
}
