//! Best-effort channel between the control surface and the audience-facing
//! presentation surface.

mod channel;
mod error;
mod link;
mod local;
mod receiver;
mod surface;

pub use channel::{DisplayChannel, DisplayOptions};
pub use error::{DisplayError, SurfaceError};
pub use link::{surface_link, ChannelSurfaceHandle, SurfaceEndpoint};
pub use local::{LaunchedSurface, LocalSurfaceLauncher};
pub use receiver::{DisplayReceiver, FrameOutcome, ListenerGuard, PLACEHOLDER_TEXT};
pub use surface::{SurfaceHandle, SurfaceLauncher};
