//! Services layer for the gateway.
//!
//! Token issuance, directory authentication, per-group authorization and
//! the outbound clients (secrets store, proxy upstream).

pub mod authz;
pub mod cache;
pub mod clock;
pub mod directory;
pub mod error;
mod jwt;
pub mod proxy;
pub mod secrets_store;
pub mod teams;

pub use authz::{
    classify, AuthzDispatcher, AuthzSettings, BackendClient, BackendClientCache, BackendFactory,
    BackendKind, ConfiguredBackendFactory,
};
pub use cache::{spawn_janitor, CacheStats, LruCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use directory::{
    BindOutcome, DirectoryAuthenticator, DirectoryConnector, DirectoryError, LdapDirectory,
    MockDirectory,
};
pub use error::GatewayError;
pub use jwt::{extract_token, IssuedToken, TokenClaims, TokenError, TokenService};
pub use proxy::ProxyForwarder;
pub use secrets_store::{
    ClientDetail, CreateClient, CreateSecret, HttpSecretStore, MockSecretStore, SecretDetail,
    SecretStore, SecretStoreError,
};
pub use teams::{PgTeamRepository, StaticTeamRepository, TeamRepository};
