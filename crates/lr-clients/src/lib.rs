//! Client directory: looks up a presented API key against a
//! `ClientRecord`. Two interchangeable backends — file and remote KV —
//! satisfy the same [`ClientDirectory`] contract.

mod file_backend;
mod remote_backend;

pub use file_backend::FileDirectory;
pub use remote_backend::RemoteDirectory;

use async_trait::async_trait;
use lr_types::ClientRecord;

/// `lookup(apiKey) → ClientRecord?`. Backend I/O failures are swallowed
/// by implementations and surfaced as a miss (`Ok(None)`) — never as an
/// error — so the caller can fall through to the legacy key list
/// exactly as it would for an unknown key.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn lookup(&self, api_key: &str) -> Option<ClientRecord>;
}
