use gateway_service::{
    build_router,
    config::{Environment, GatewayConfig},
    services::{
        spawn_janitor, teams::team_repository_from_config, AuthzDispatcher, AuthzSettings,
        BackendClientCache, ConfiguredBackendFactory, DirectoryAuthenticator, HttpSecretStore,
        LdapDirectory, ProxyForwarder, TokenService,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

const CACHE_JANITOR_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = GatewayConfig::load()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    for setting in config.insecure_settings() {
        if config.environment == Environment::Prod {
            tracing::error!(setting, "Certificate verification disabled in production");
        } else {
            tracing::warn!(setting, "Certificate verification disabled");
        }
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        default_domain = %config.default_domain,
        "Starting gateway service"
    );

    let tokens = TokenService::new(&config.jwt)?;
    tracing::info!(issuer = %config.jwt.issuer, "Token service initialized");

    let connector = Arc::new(LdapDirectory::new(&config.ldap));
    let directory = Arc::new(DirectoryAuthenticator::new(connector, &config.ldap)?);
    let _janitor = spawn_janitor(directory.search_cache(), CACHE_JANITOR_INTERVAL);
    tracing::info!(
        url = %config.ldap.url,
        pool_size = config.ldap.pool_size,
        "Directory authenticator initialized"
    );

    let teams = team_repository_from_config(&config.teams).await?;
    let factory = Arc::new(ConfiguredBackendFactory::new(config.authz.clone(), teams));
    let clients = Arc::new(BackendClientCache::new(config.authz.client_cache_capacity));
    let authz = Arc::new(AuthzDispatcher::new(
        AuthzSettings::from(&config.authz),
        factory,
        clients,
    ));
    tracing::info!("Authorization dispatcher initialized");

    let secrets = Arc::new(HttpSecretStore::new(&config.secrets_store)?);
    let proxy = Arc::new(ProxyForwarder::new(&config.proxy, &config.jwt.header)?);
    tracing::info!(
        secrets_store = %config.secrets_store.url,
        upstream = %config.proxy.target,
        "Outbound clients initialized"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("invalid listen address: {}", e)))?;
    let config = Arc::new(config);

    let state = AppState {
        config: config.clone(),
        tokens,
        directory,
        authz,
        secrets,
        proxy,
    };
    let app = build_router(state)?;

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
