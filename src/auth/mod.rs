//! Request authentication.

mod guard;

pub use guard::{AuthContext, AuthError, AuthGuard};
