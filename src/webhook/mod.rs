pub mod error;
pub mod pipeline;
pub mod signature;

pub use error::{ValidationError, WebhookError};
pub use pipeline::{Acknowledgement, WEBHOOK_PATH, WebhookPipeline, WebhookRequest};
pub use signature::{SIGNATURE_HEADER, SignatureError, SignatureVerifier, Verification};
