//! Team membership lookups for local authorization.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::GatewayError;
use crate::config::TeamsConfig;
use crate::models::Team;

#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Teams `username` belongs to that are scoped to `org`, either
    /// org-wide or to `assembly`.
    async fn get_teams(
        &self,
        username: &str,
        org: &str,
        assembly: &str,
    ) -> Result<Vec<Team>, GatewayError>;
}

/// Reads teams from the deployment-management database.
///
/// The schema belongs to that system; this side only reads it.
#[derive(Clone)]
pub struct PgTeamRepository {
    pool: PgPool,
}

const TEAMS_FOR_USER_QUERY: &str = r#"
    SELECT DISTINCT t.name, t.description, t.design_enabled, t.transition_enabled, t.operations_enabled
    FROM teams t
    JOIN team_members m ON m.team_id = t.id
    LEFT JOIN team_assemblies a ON a.team_id = t.id
    WHERE lower(m.username) = lower($1)
      AND t.org_name = $2
      AND (t.org_scope OR a.assembly_name = $3)
"#;

impl PgTeamRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &TeamsConfig, database_url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to team database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        tracing::info!("Successfully connected to team database");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TeamRepository for PgTeamRepository {
    async fn get_teams(
        &self,
        username: &str,
        org: &str,
        assembly: &str,
    ) -> Result<Vec<Team>, GatewayError> {
        sqlx::query_as::<_, Team>(TEAMS_FOR_USER_QUERY)
            .bind(username)
            .bind(org)
            .bind(assembly)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, org, assembly, "Team lookup failed");
                GatewayError::ServiceUnavailable(format!("team database: {}", e))
            })
    }
}

/// In-memory team table keyed by `(username, org, assembly)`.
///
/// Used when no database is configured and in tests.
#[derive(Default)]
pub struct StaticTeamRepository {
    teams: Mutex<HashMap<(String, String, String), Vec<Team>>>,
}

impl StaticTeamRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_team(self, username: &str, org: &str, assembly: &str, team: Team) -> Self {
        self.add_team(username, org, assembly, team);
        self
    }

    pub fn add_team(&self, username: &str, org: &str, assembly: &str, team: Team) {
        self.teams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((username.to_lowercase(), org.to_string(), assembly.to_string()))
            .or_default()
            .push(team);
    }
}

#[async_trait]
impl TeamRepository for StaticTeamRepository {
    async fn get_teams(
        &self,
        username: &str,
        org: &str,
        assembly: &str,
    ) -> Result<Vec<Team>, GatewayError> {
        let teams = self.teams.lock().unwrap_or_else(|e| e.into_inner());
        Ok(teams
            .get(&(username.to_lowercase(), org.to_string(), assembly.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Builds the configured repository: Postgres when a URL is set, otherwise an
/// empty static table.
pub async fn team_repository_from_config(
    config: &TeamsConfig,
) -> Result<Arc<dyn TeamRepository>, anyhow::Error> {
    match &config.database_url {
        Some(url) => Ok(Arc::new(
            PgTeamRepository::connect(config, url.expose_secret()).await?,
        )),
        None => {
            tracing::warn!("No team database configured, local authorization will deny every request");
            Ok(Arc::new(StaticTeamRepository::new()))
        }
    }
}
