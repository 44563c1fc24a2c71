//! Service wiring shared by the router and the binary.

use std::sync::Arc;

use orglicense_infra::{
    ExpirationSettings, IdentityService, InvitationService, LicenseService, LogNotifier,
    OrganizationService, Store,
};

/// The managers behind the HTTP surface, built over one shared store.
pub struct AppServices {
    pub identity: IdentityService,
    pub orgs: OrganizationService,
    pub invitations: InvitationService,
    pub licenses: LicenseService,
}

/// Wire the services, loading the expiration setting from the store.
pub async fn build_services(store: Arc<dyn Store>) -> AppServices {
    let settings = ExpirationSettings::new(store.clone());
    settings.initialize().await;

    AppServices {
        identity: IdentityService::new(store.clone()),
        orgs: OrganizationService::new(store.clone()),
        invitations: InvitationService::new(store.clone(), Arc::new(LogNotifier)),
        licenses: LicenseService::new(store, settings),
    }
}
