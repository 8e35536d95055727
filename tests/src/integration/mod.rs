//! Cross-crate integration flows.

pub mod low_level;
pub mod request_reply;
pub mod shutdown;
