//! Session lifecycle: persisted record, lazy expiry, and token refresh.

pub mod clock;
pub mod model;
pub mod refresh;
pub mod store;
mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use model::{Session, SessionSignal, SessionUser};
pub use refresh::RefreshCoordinator;
pub use store::SessionStore;
