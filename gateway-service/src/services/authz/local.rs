use std::sync::Arc;

use crate::models::{AppGroup, Principal};
use crate::services::teams::TeamRepository;
use crate::services::GatewayError;

/// Authorizes against team memberships kept by the deployment-management
/// database.
pub struct LocalTeamBackend {
    teams: Arc<dyn TeamRepository>,
    admin_team: String,
}

impl LocalTeamBackend {
    pub fn new(teams: Arc<dyn TeamRepository>, admin_team: impl Into<String>) -> Self {
        Self {
            teams,
            admin_team: admin_team.into(),
        }
    }

    /// True when the user is in the org-wide admin team or the admin team of
    /// the group's assembly, and that team has design and transition rights.
    pub async fn authorize(
        &self,
        group: &AppGroup,
        principal: &Principal,
    ) -> Result<bool, GatewayError> {
        let (Some(org), Some(assembly)) = (group.org(), group.assembly()) else {
            tracing::warn!(group = %group, "Group has no org/assembly, denying");
            return Ok(false);
        };

        let teams = self
            .teams
            .get_teams(&principal.username, org, assembly)
            .await?;

        let assembly_admin = format!("{}-{}", self.admin_team, assembly);
        let authorized = teams.iter().any(|team| {
            (team.name == self.admin_team || team.name == assembly_admin)
                && team.can_manage_secrets()
        });

        tracing::debug!(
            group = %group,
            user = %principal.username,
            teams = teams.len(),
            authorized,
            "Local team authorization"
        );
        Ok(authorized)
    }
}
