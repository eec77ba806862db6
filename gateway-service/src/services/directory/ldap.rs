use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::{BindOutcome, DirectoryConnector, DirectoryError};
use crate::config::LdapConfig;

const RC_SUCCESS: u32 = 0;
const RC_INVALID_CREDENTIALS: u32 = 49;

/// LDAP connector backed by a bounded pool of service-account connections.
///
/// At most `pool_size` connections exist at once. A checkout waits for a
/// semaphore permit (up to `pool_timeout`), then reuses an idle connection or
/// opens a new one. Connections that see any error are dropped instead of
/// being returned to the pool.
pub struct LdapDirectory {
    url: String,
    bind_dn: String,
    bind_password: SecretString,
    starttls: bool,
    no_tls_verify: bool,
    connect_timeout: Duration,
    operation_timeout: Duration,
    pool_timeout: Duration,
    permits: Semaphore,
    idle: Mutex<Vec<Ldap>>,
}

impl LdapDirectory {
    pub fn new(config: &LdapConfig) -> Self {
        tracing::info!(
            url = %config.url,
            pool_size = config.pool_size,
            "LDAP directory pool configured"
        );

        Self {
            url: config.url.clone(),
            bind_dn: config.bind_dn.clone(),
            bind_password: config.bind_password.clone(),
            starttls: config.starttls,
            no_tls_verify: config.no_tls_verify,
            connect_timeout: config.connect_timeout(),
            operation_timeout: config.operation_timeout(),
            pool_timeout: config.pool_timeout(),
            permits: Semaphore::new(config.pool_size.max(1)),
            idle: Mutex::new(Vec::with_capacity(config.pool_size)),
        }
    }

    pub fn idle_connections(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Opens a connection and binds it as the service account.
    async fn connect(&self) -> Result<Ldap, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.connect_timeout)
            .set_starttls(self.starttls)
            .set_no_tls_verify(self.no_tls_verify);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        ldap3::drive!(conn);

        self.bind_service_account(&mut ldap).await?;
        tracing::debug!(url = %self.url, "Opened LDAP connection");
        Ok(ldap)
    }

    async fn bind_service_account(&self, ldap: &mut Ldap) -> Result<(), DirectoryError> {
        let result = self
            .bounded(
                "service bind",
                ldap.simple_bind(&self.bind_dn, self.bind_password.expose_secret()),
            )
            .await?;

        if result.rc != RC_SUCCESS {
            return Err(DirectoryError::Protocol(format!(
                "service account bind failed with rc={} ({})",
                result.rc, result.text
            )));
        }
        Ok(())
    }

    /// Runs `op` on a pooled connection. The connection goes back to the
    /// pool only if `op` succeeded.
    async fn with_connection<T, F>(&self, op: F) -> Result<T, DirectoryError>
    where
        F: for<'a> FnOnce(
            &'a Self,
            &'a mut Ldap,
        ) -> std::pin::Pin<
            Box<dyn Future<Output = Result<T, DirectoryError>> + Send + 'a>,
        >,
    {
        let _permit = tokio::time::timeout(self.pool_timeout, self.permits.acquire())
            .await
            .map_err(|_| DirectoryError::Timeout("waiting for a pooled connection".to_string()))?
            .map_err(|_| DirectoryError::Unavailable("connection pool closed".to_string()))?;

        let pooled = self.idle.lock().unwrap_or_else(|e| e.into_inner()).pop();
        let mut ldap = match pooled {
            Some(ldap) => ldap,
            None => self.connect().await?,
        };

        let result = op(self, &mut ldap).await;
        if result.is_ok() {
            self.idle
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(ldap);
        } else {
            tracing::debug!("Discarding LDAP connection after error");
        }
        result
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, LdapError>>,
    ) -> Result<T, DirectoryError> {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_ldap_error(e)),
            Err(_) => Err(DirectoryError::Timeout(what.to_string())),
        }
    }
}

fn map_ldap_error(err: LdapError) -> DirectoryError {
    match err {
        LdapError::Io { .. } | LdapError::EndOfStream => DirectoryError::Unavailable(err.to_string()),
        other => DirectoryError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl DirectoryConnector for LdapDirectory {
    async fn search_dns(&self, base_dn: &str, filter: &str) -> Result<Vec<String>, DirectoryError> {
        let base_dn = base_dn.to_string();
        let filter = filter.to_string();

        self.with_connection(move |dir, ldap| {
            Box::pin(async move {
                let (entries, _) = dir
                    .bounded(
                        "search",
                        ldap.search(&base_dn, Scope::Subtree, &filter, vec!["1.1"]),
                    )
                    .await?
                    .success()
                    .map_err(map_ldap_error)?;

                Ok(entries
                    .into_iter()
                    .map(|entry| SearchEntry::construct(entry).dn)
                    .collect())
            })
        })
        .await
    }

    async fn bind(&self, dn: &str, password: &SecretString) -> Result<BindOutcome, DirectoryError> {
        let dn = dn.to_string();
        let password = password.clone();

        self.with_connection(move |dir, ldap| {
            Box::pin(async move {
                let result = dir
                    .bounded("user bind", ldap.simple_bind(&dn, password.expose_secret()))
                    .await?;

                let outcome = match result.rc {
                    RC_SUCCESS => BindOutcome::Accepted,
                    RC_INVALID_CREDENTIALS => BindOutcome::Rejected,
                    rc => {
                        return Err(DirectoryError::Protocol(format!(
                            "user bind failed with rc={} ({})",
                            rc, result.text
                        )))
                    }
                };

                // The connection is now bound as the user; restore the service
                // identity before it goes back to the pool.
                dir.bind_service_account(ldap).await?;
                Ok(outcome)
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> LdapConfig {
        LdapConfig {
            url: url.to_string(),
            base_dn: "DC=example,DC=com".to_string(),
            user_search_filter: "(sAMAccountName={0})".to_string(),
            bind_dn: "CN=svc,DC=example,DC=com".to_string(),
            bind_password: SecretString::new("svc".to_string()),
            pool_size: 2,
            connect_timeout_ms: 500,
            operation_timeout_ms: 500,
            pool_timeout_ms: 500,
            search_cache_capacity: 10,
            search_cache_ttl_seconds: 60,
            default_role: "ROLE_USER".to_string(),
            starttls: false,
            no_tls_verify: false,
        }
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_unavailable() {
        let directory = LdapDirectory::new(&config("ldap://127.0.0.1:1"));

        let result = directory
            .search_dns("DC=example,DC=com", "(sAMAccountName=alice)")
            .await;

        assert!(matches!(result, Err(DirectoryError::Unavailable(_))));
        assert_eq!(directory.idle_connections(), 0);
    }

    #[tokio::test]
    async fn test_failed_checkout_releases_permit() {
        let directory = LdapDirectory::new(&config("ldap://127.0.0.1:1"));

        // More attempts than permits: each failure must hand its permit back.
        for _ in 0..5 {
            let result = directory
                .bind("CN=alice,DC=example,DC=com", &SecretString::new("pw".to_string()))
                .await;
            assert!(matches!(result, Err(DirectoryError::Unavailable(_))));
        }
        assert_eq!(directory.permits.available_permits(), 2);
    }

    #[test]
    fn test_io_errors_mean_unavailable() {
        let io = LdapError::Io {
            source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
        };
        assert!(matches!(map_ldap_error(io), DirectoryError::Unavailable(_)));
        assert!(matches!(
            map_ldap_error(LdapError::EndOfStream),
            DirectoryError::Unavailable(_)
        ));
    }
}
