//! Sign-in and session handling.

mod identity;
mod middleware;
mod session;

pub use identity::{AuthError, Authenticator, DisabledAuthenticator, HttpAuthenticator, Identity};
pub use middleware::AuthUser;
pub use session::{Session, SessionRegistry};
