//! Browser sessions: the per-user state carried between the threshold form,
//! the OAuth callback and the confirmation page.

mod store;
mod worker;

pub use store::{
    MemorySessionStore, SessionError, SessionResult, SessionStore, Stage, SweepSession,
};
pub use worker::start_session_cleanup_worker;
