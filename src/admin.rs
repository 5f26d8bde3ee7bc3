//! Admin page links handed out from the chat menu.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// How long an issued admin link stays valid
pub const ADMIN_LINK_VALIDITY: Duration = Duration::from_secs(60 * 60);

/// Issues a signed, time-limited link to the admin page for a user
#[async_trait]
pub trait AdminLinkIssuer: Send + Sync {
    async fn issue(&self, user_id: &str, valid_for: Duration) -> Result<String>;
}
