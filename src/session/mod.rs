pub mod cleanup;
pub mod store;
pub mod types;

pub use cleanup::Cleanup;
pub use store::{DEFAULT_SESSION_TTL, SessionStore};
pub use types::{Message, Origin, Session};
