pub mod client;
pub mod types;

use crate::store::Account;
use async_trait::async_trait;
use thiserror::Error;
use types::{FollowPage, ListKind};

/// Failure taxonomy for remote growth-platform calls.
///
/// Every operation resolves to `Result<T, ApiError>` — no raw transport
/// error crosses the client boundary, so loops can treat each failure as
/// "log, back off, continue".
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure reaching the remote API.
    #[error("transport error: {0}")]
    Transport(String),
    /// Non-2xx status or a malformed response body.
    #[error("api error ({status}): {detail}")]
    Remote { status: u16, detail: String },
    /// No bearer token configured for the account. Not retried.
    #[error("no bearer token configured for account \"{0}\"")]
    MissingCredential(String),
}

/// The four remote operations the engine drives, parameterized per call by
/// an account's credential. Implemented by [`client::EcoxClient`]; tests
/// substitute a scripted mock.
#[async_trait]
pub trait GrowthApi: Send + Sync {
    /// Total follower count of the account itself (minimal page query).
    async fn follower_count(&self, account: &Account) -> Result<u64, ApiError>;

    /// One page of a relationship list. `username` selects whose list;
    /// `None` means the account's own. `offset` is 1-based.
    async fn list_follow(
        &self,
        account: &Account,
        username: Option<&str>,
        offset: u32,
        limit: u32,
        kind: ListKind,
    ) -> Result<FollowPage, ApiError>;

    async fn follow(&self, account: &Account, uid: &str) -> Result<(), ApiError>;

    async fn unfollow(&self, account: &Account, uid: &str) -> Result<(), ApiError>;

    /// Daily reward claim. Returns the platform's message on success; the
    /// caller classifies "already claimed" failures separately.
    async fn claim_daily(&self, account: &Account) -> Result<String, ApiError>;
}
