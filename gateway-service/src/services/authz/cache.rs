use std::sync::Arc;

use super::{BackendClient, BackendKind};
use crate::config::AuthzConfig;
use crate::models::AppGroup;
use crate::services::cache::{CacheStats, LruCache};
use crate::services::teams::TeamRepository;
use crate::services::GatewayError;

use super::delegated::DelegatedTenantBackend;
use super::local::LocalTeamBackend;
use super::managed_service::ManagedServiceBackend;

pub const BACKEND_CACHE_SIZE_METRIC: &str = "gateway_backend_cache_size";

/// Builds the backend client for a group.
pub trait BackendFactory: Send + Sync {
    fn create(&self, group: &AppGroup, kind: BackendKind) -> Result<BackendClient, GatewayError>;
}

/// Factory wired from configuration: one shared team repository for local
/// groups, per-domain endpoints for the remote tenants.
pub struct ConfiguredBackendFactory {
    config: AuthzConfig,
    teams: Arc<dyn TeamRepository>,
}

impl ConfiguredBackendFactory {
    pub fn new(config: AuthzConfig, teams: Arc<dyn TeamRepository>) -> Self {
        Self { config, teams }
    }
}

impl BackendFactory for ConfiguredBackendFactory {
    fn create(&self, group: &AppGroup, kind: BackendKind) -> Result<BackendClient, GatewayError> {
        let domain = group.domain();
        let missing = |system: &str| {
            tracing::error!(%domain, system, "No authorization endpoint configured");
            GatewayError::ServiceUnavailable(format!(
                "no {} authorization endpoint configured for domain {}",
                system, domain
            ))
        };

        match kind {
            BackendKind::Local => Ok(BackendClient::Local(LocalTeamBackend::new(
                self.teams.clone(),
                self.config.admin_team.clone(),
            ))),
            BackendKind::ManagedService => {
                let endpoint = self
                    .config
                    .managed_service
                    .get(&domain)
                    .ok_or_else(|| missing("managed service"))?;
                Ok(BackendClient::ManagedService(ManagedServiceBackend::new(
                    endpoint,
                    &self.config.managed_service_token_header,
                )?))
            }
            BackendKind::DelegatedTenant => {
                let endpoint = self
                    .config
                    .delegated_tenant
                    .get(&domain)
                    .ok_or_else(|| missing("delegated tenant"))?;
                Ok(BackendClient::DelegatedTenant(DelegatedTenantBackend::new(
                    endpoint,
                )?))
            }
        }
    }
}

/// Backend clients keyed by domain-qualified group name.
///
/// A client is built at most once per group, even when first requested by
/// many tasks at once, and is kept across failed calls. The cache is bounded
/// and evicts the least recently used group.
pub struct BackendClientCache {
    clients: LruCache<String, Arc<BackendClient>>,
}

impl BackendClientCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: LruCache::new(capacity, None, BACKEND_CACHE_SIZE_METRIC),
        }
    }

    pub fn get_or_try_insert_with<F>(
        &self,
        name: &str,
        ctor: F,
    ) -> Result<Arc<BackendClient>, GatewayError>
    where
        F: FnOnce() -> Result<BackendClient, GatewayError>,
    {
        self.clients
            .get_or_try_insert_with(name.to_string(), || ctor().map(Arc::new))
    }

    pub fn stats(&self) -> CacheStats {
        self.clients.stats()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clear(&self) {
        self.clients.clear();
    }
}
