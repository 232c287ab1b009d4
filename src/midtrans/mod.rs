pub mod client;
pub mod signature;

pub use client::{SnapClient, SnapResponse, SANDBOX_SNAP_URL};
pub use signature::{notification_signature, verify_notification_signature};
