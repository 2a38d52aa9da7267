//! # caselink-auth
//!
//! Client-side session handling for the CaseLink admin dashboard.
//!
//! ## Modules
//!
//! - `session`: persisted session record, lazy expiry, single-flight refresh
//! - `api`: HTTP calls to the auth controller (verify, refresh, login)
//! - `request`: bearer-authenticated requests with refresh-on-401

pub mod api;
pub mod request;
pub mod session;

pub use api::{AuthApi, HttpAuthApi};
pub use request::{ApiResponse, AuthenticatedRequestClient, LogRedirect, LoginRedirect};
pub use session::{
    Clock, ManualClock, RefreshCoordinator, Session, SessionSignal, SessionStore, SessionUser,
    SystemClock,
};
