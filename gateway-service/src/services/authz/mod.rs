//! Per-group authorization.
//!
//! Every group is owned by exactly one system. [`classify`] picks it from the
//! group name alone, and the matching [`BackendClient`] makes the decision.
//! Clients are cached per group in a [`BackendClientCache`].

mod cache;
mod delegated;
mod local;
mod managed_service;

use std::sync::Arc;
use std::time::Instant;

use crate::config::AuthzConfig;
use crate::models::{AppGroup, Principal};
use crate::services::GatewayError;

pub use cache::{
    BackendClientCache, BackendFactory, ConfiguredBackendFactory, BACKEND_CACHE_SIZE_METRIC,
};
pub use delegated::DelegatedTenantBackend;
pub use local::LocalTeamBackend;
pub use managed_service::ManagedServiceBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Team memberships in the local deployment-management database.
    Local,
    ManagedService,
    DelegatedTenant,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::ManagedService => "managed_service",
            BackendKind::DelegatedTenant => "delegated_tenant",
        }
    }
}

/// Name markers used to route a group to its owning system.
#[derive(Debug, Clone)]
pub struct AuthzSettings {
    pub managed_service_org_prefix: String,
    pub delegated_tenant_domain_prefix: String,
}

impl From<&AuthzConfig> for AuthzSettings {
    fn from(config: &AuthzConfig) -> Self {
        Self {
            managed_service_org_prefix: config.managed_service_org_prefix.clone(),
            delegated_tenant_domain_prefix: config.delegated_tenant_domain_prefix.clone(),
        }
    }
}

/// Managed-service orgs win over the domain; everything unmarked is local.
pub fn classify(group: &AppGroup, settings: &AuthzSettings) -> BackendKind {
    let managed = group
        .org()
        .is_some_and(|org| org.starts_with(&settings.managed_service_org_prefix));

    if managed {
        BackendKind::ManagedService
    } else if group
        .domain()
        .as_str()
        .starts_with(&settings.delegated_tenant_domain_prefix)
    {
        BackendKind::DelegatedTenant
    } else {
        BackendKind::Local
    }
}

pub enum BackendClient {
    Local(LocalTeamBackend),
    ManagedService(ManagedServiceBackend),
    DelegatedTenant(DelegatedTenantBackend),
}

impl BackendClient {
    pub async fn authorize(
        &self,
        group: &AppGroup,
        principal: &Principal,
    ) -> Result<bool, GatewayError> {
        match self {
            BackendClient::Local(backend) => backend.authorize(group, principal).await,
            BackendClient::ManagedService(backend) => backend.authorize(group, principal).await,
            BackendClient::DelegatedTenant(backend) => backend.authorize(group, principal).await,
        }
    }
}

pub struct AuthzDispatcher {
    settings: AuthzSettings,
    factory: Arc<dyn BackendFactory>,
    clients: Arc<BackendClientCache>,
}

impl AuthzDispatcher {
    pub fn new(
        settings: AuthzSettings,
        factory: Arc<dyn BackendFactory>,
        clients: Arc<BackendClientCache>,
    ) -> Self {
        Self {
            settings,
            factory,
            clients,
        }
    }

    pub fn clients(&self) -> &Arc<BackendClientCache> {
        &self.clients
    }

    /// Decides whether `principal` may manage secrets of `group`.
    ///
    /// `Ok(false)` is a denial; `Err` means no decision could be made.
    #[tracing::instrument(skip(self, group, principal), fields(group = %group, user = %principal.username))]
    pub async fn authorize(
        &self,
        group: &AppGroup,
        principal: &Principal,
    ) -> Result<bool, GatewayError> {
        let kind = classify(group, &self.settings);
        let client = self
            .clients
            .get_or_try_insert_with(&group.qualified_name(), || {
                tracing::info!(backend = kind.as_str(), "Creating authorization backend client");
                self.factory.create(group, kind)
            })?;

        let start = Instant::now();
        let result = client.authorize(group, principal).await;
        let outcome = match &result {
            Ok(true) => "allowed",
            Ok(false) => "denied",
            Err(_) => "error",
        };

        metrics::counter!(
            "gateway_authz_total",
            "backend" => kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("gateway_authz_duration_seconds", "backend" => kind.as_str())
            .record(start.elapsed().as_secs_f64());

        tracing::info!(backend = kind.as_str(), outcome, "Authorization decision");
        result
    }

    /// Like [`authorize`](Self::authorize), turning a denial into
    /// `NotAuthorized`.
    pub async fn ensure_authorized(
        &self,
        group: &AppGroup,
        principal: &Principal,
    ) -> Result<(), GatewayError> {
        if self.authorize(group, principal).await? {
            Ok(())
        } else {
            Err(GatewayError::NotAuthorized(format!(
                "{} is not authorized to manage secrets of {}",
                principal.display_name_or_username(),
                group.canonical_path()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthDomain;

    fn settings() -> AuthzSettings {
        AuthzSettings::from(&AuthzConfig::default())
    }

    fn kind(domain: AuthDomain, raw: &str) -> BackendKind {
        classify(&AppGroup::parse(domain, raw).unwrap(), &settings())
    }

    #[test]
    fn test_classify() {
        assert_eq!(kind(AuthDomain::Prod, "oneops_myapp_prod"), BackendKind::Local);
        assert_eq!(kind(AuthDomain::MsProd, "oneops_myapp_prod"), BackendKind::Local);
        assert_eq!(
            kind(AuthDomain::Prod, "ms-payments_api_prod"),
            BackendKind::ManagedService
        );
        assert_eq!(
            kind(AuthDomain::TenantProd, "org_proj_env"),
            BackendKind::DelegatedTenant
        );
        assert_eq!(
            kind(AuthDomain::Prod, "tenant-dev_org_proj_env"),
            BackendKind::DelegatedTenant
        );
    }

    #[test]
    fn test_managed_service_org_wins_over_tenant_domain() {
        assert_eq!(
            kind(AuthDomain::TenantProd, "ms-payments_api_prod"),
            BackendKind::ManagedService
        );
    }

    #[test]
    fn test_classify_is_deterministic() {
        let group = AppGroup::parse(AuthDomain::TenantStg, "org_proj_env").unwrap();
        let first = classify(&group, &settings());
        for _ in 0..10 {
            assert_eq!(classify(&group, &settings()), first);
        }
    }
}
