use shared::protocol::DisplayMessage;
use tokio::{
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender},
        watch,
    },
    task::JoinHandle,
};
use tracing::debug;

/// Shown by renderers while nothing has been displayed yet.
pub const PLACEHOLDER_TEXT: &str = "Ready to display";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Displayed,
    Ignored,
}

/// Presentation-side state: the text currently on screen.
#[derive(Debug, Clone, Default)]
pub struct DisplayReceiver {
    displayed: String,
}

impl DisplayReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn displayed(&self) -> &str {
        &self.displayed
    }

    pub fn render(&self) -> &str {
        if self.displayed.is_empty() {
            PLACEHOLDER_TEXT
        } else {
            &self.displayed
        }
    }

    pub fn handle_frame(&mut self, frame: &str) -> FrameOutcome {
        match DisplayMessage::from_frame(frame) {
            Some(message) => self.handle(message),
            None => {
                debug!(len = frame.len(), "ignoring unrecognized display frame");
                FrameOutcome::Ignored
            }
        }
    }

    /// Applying the same update twice leaves the same text on screen.
    pub fn handle(&mut self, message: DisplayMessage) -> FrameOutcome {
        match message {
            DisplayMessage::ContentUpdate { text } => {
                self.displayed = text;
                FrameOutcome::Displayed
            }
            DisplayMessage::Ready => FrameOutcome::Ignored,
        }
    }

    /// Registers the single message listener for this surface.
    ///
    /// When `announce` is given, one `READY` frame is sent through it before
    /// the first inbound frame is read. The listener stops when `inbound`
    /// closes or when the returned guard is dropped.
    pub fn listen(
        self,
        mut inbound: UnboundedReceiver<String>,
        announce: Option<UnboundedSender<String>>,
    ) -> ListenerGuard {
        let (displayed_tx, displayed_rx) = watch::channel(self.displayed.clone());
        let task = tokio::spawn(async move {
            let mut receiver = self;
            if let Some(announce) = &announce {
                if let Ok(frame) = DisplayMessage::Ready.to_frame() {
                    let _ = announce.send(frame);
                }
            }
            while let Some(frame) = inbound.recv().await {
                if receiver.handle_frame(&frame) == FrameOutcome::Displayed {
                    displayed_tx.send_replace(receiver.displayed.clone());
                }
            }
            drop(announce);
        });
        ListenerGuard {
            task,
            displayed: displayed_rx,
        }
    }
}

/// Keeps a receiver's listener registered; dropping it unregisters.
pub struct ListenerGuard {
    task: JoinHandle<()>,
    displayed: watch::Receiver<String>,
}

impl ListenerGuard {
    pub fn displayed(&self) -> String {
        self.displayed.borrow().clone()
    }

    /// Waits for the next displayed update. `false` once the listener stopped.
    pub async fn changed(&mut self) -> bool {
        self.displayed.changed().await.is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "tests/receiver_tests.rs"]
mod tests;
