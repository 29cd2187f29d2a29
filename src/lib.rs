//! whatsrelay: a Twilio WhatsApp webhook relay.
//!
//! Inbound messages are authenticated, recorded in a short-lived per-sender
//! session, classified into a command and answered, optionally with the help
//! of a chat-completion service. Replies go back out through the Twilio
//! Messages API without holding up the webhook acknowledgement.

pub mod bot;
pub mod channels;
pub mod chat;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod providers;
pub mod session;
pub mod webhook;
