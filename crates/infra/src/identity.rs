//! Identity resolution: maps an authenticated external identity to an
//! internal user record, creating it on first sight.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use orglicense_auth::IdentityClaims;
use orglicense_core::AppResult;
use orglicense_directory::User;

use crate::store::Store;

#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn Store>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve the claims to a user record, creating or refreshing it.
    ///
    /// Claims win on every request: a stored email or platform role that
    /// drifted from the provider's latest claims is overwritten here. Callers
    /// cache the result for the lifetime of one request.
    pub async fn get_or_create(&self, claims: &IdentityClaims) -> AppResult<User> {
        let now = Utc::now();
        match self.store.find_user_by_external_id(&claims.external_id).await? {
            Some(mut user) => {
                if user.refresh_from_claims(claims, now) {
                    self.store.upsert_user(&user).await?;
                }
                Ok(user)
            }
            None => {
                let user = User::from_claims(claims, now);
                self.store.upsert_user(&user).await?;
                info!(user_id = %user.id, external_id = %user.external_id, "created user on first sight");
                Ok(user)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orglicense_auth::PlatformRole;

    use crate::store::InMemoryStore;

    fn claims(external_id: &str, email: &str, role: PlatformRole) -> IdentityClaims {
        IdentityClaims {
            external_id: external_id.to_string(),
            email: email.to_string(),
            platform_role: role,
        }
    }

    #[tokio::test]
    async fn creates_a_user_on_first_sight() {
        let service = IdentityService::new(Arc::new(InMemoryStore::new()));
        let user = service
            .get_or_create(&claims("auth0|u1", "a@x.com", PlatformRole::User))
            .await
            .unwrap();
        assert_eq!(user.external_id, "auth0|u1");
        assert_eq!(user.email, "a@x.com");
    }

    #[tokio::test]
    async fn reuses_the_record_and_refreshes_drifted_claims() {
        let service = IdentityService::new(Arc::new(InMemoryStore::new()));
        let first = service
            .get_or_create(&claims("auth0|u1", "a@x.com", PlatformRole::User))
            .await
            .unwrap();

        let second = service
            .get_or_create(&claims("auth0|u1", "renamed@x.com", PlatformRole::Admin))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.email, "renamed@x.com");
        assert_eq!(second.platform_role, PlatformRole::Admin);
    }
}
