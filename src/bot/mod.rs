//! Command classification and reply synthesis

pub mod command;
pub mod reply;

pub use command::{Command, classify};
pub use reply::ReplySynthesizer;
