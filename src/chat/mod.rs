pub mod types;

pub use types::{InboundMessage, OutboundMessage};
