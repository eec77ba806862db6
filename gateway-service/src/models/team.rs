use serde::{Deserialize, Serialize};

/// Team membership record for one user in one org/assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub design_enabled: bool,
    pub transition_enabled: bool,
    pub operations_enabled: bool,
}

impl Team {
    /// Secrets management requires both design and transition rights.
    pub fn can_manage_secrets(&self) -> bool {
        self.design_enabled && self.transition_enabled
    }
}
