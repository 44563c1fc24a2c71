//! Invitation notification boundary.
//!
//! Delivery is best-effort and asynchronous; the invitation workflow never
//! waits on or fails with the notifier.

use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait InvitationNotifier: Send + Sync {
    async fn notify_invitation(
        &self,
        email: &str,
        org_name: &str,
        token: &str,
    ) -> anyhow::Result<()>;
}

/// Log-only notifier; stands in for a real mail transport.
pub struct LogNotifier;

#[async_trait]
impl InvitationNotifier for LogNotifier {
    async fn notify_invitation(
        &self,
        email: &str,
        org_name: &str,
        token: &str,
    ) -> anyhow::Result<()> {
        info!(
            email = %email,
            organization = %org_name,
            token = %token,
            "invitation notification"
        );
        Ok(())
    }
}
