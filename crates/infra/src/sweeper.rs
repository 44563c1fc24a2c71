//! Background renewal sweeper.
//!
//! One long-lived task, fixed delay between passes (a slow pass delays the
//! next tick, it never stacks). Errors are logged and the loop continues;
//! shutdown is cooperative and checked once per iteration.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::licenses::LicenseService;

/// Default delay between sweep passes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Handle to stop and join the sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Request graceful shutdown and wait for the task to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

pub struct RenewalSweeper;

impl RenewalSweeper {
    pub fn spawn(licenses: LicenseService, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            info!("license renewal sweeper started");
            loop {
                if let Err(err) = licenses.renew_expired().await {
                    error!(error = %err, "license renewal sweep failed");
                }

                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("license renewal sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration as ChronoDuration, Utc};

    use orglicense_auth::{IdentityClaims, PlatformRole};

    use crate::store::{InMemoryStore, LicenseStore};
    use crate::{ExpirationSettings, IdentityService, OrganizationService};

    #[tokio::test]
    async fn sweeper_renews_expired_licenses_and_stops_on_shutdown() {
        let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
        let settings = ExpirationSettings::new(store.clone());
        let licenses = LicenseService::new(store.clone(), settings);
        let orgs = OrganizationService::new(store.clone());
        let identity = IdentityService::new(store.clone());

        let owner = identity
            .get_or_create(&IdentityClaims {
                external_id: "ext|u1".to_string(),
                email: "u1@x.com".to_string(),
                platform_role: PlatformRole::User,
            })
            .await
            .unwrap();
        let org = orgs.create("Acme", None, &owner).await.unwrap();
        let license = licenses.create(org.id, true).await.unwrap();

        let mut expired = store.find_license(license.id).await.unwrap().unwrap();
        expired.expires_at = Utc::now() - ChronoDuration::minutes(5);
        store.update_license(&expired).await.unwrap();

        let handle = RenewalSweeper::spawn(licenses, Duration::from_millis(20));

        let mut renewed = false;
        for _ in 0..100 {
            let current = store.find_license(license.id).await.unwrap().unwrap();
            if current.expires_at > Utc::now() {
                renewed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(renewed, "sweeper did not renew the license in time");

        handle.shutdown().await;
    }
}
