//! Authentication module
//!
//! OAuth login redirect, code exchange and the process's current session.

mod client;
mod session;

pub use client::AuthSession;
pub(crate) use client::endpoint;
pub use session::{AccessToken, Session, SessionStore};
