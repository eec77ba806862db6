use secrecy::SecretString;
use serde::Serialize;

use super::AuthDomain;

/// Role granted to every user the directory authenticates.
pub const DEFAULT_ROLE: &str = "ROLE_USER";

/// An authenticated caller. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub domain: AuthDomain,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(username: impl Into<String>, domain: AuthDomain) -> Self {
        Self {
            username: username.into(),
            display_name: None,
            domain,
            roles: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Name used in audit and error messages.
    pub fn display_name_or_username(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Username and password for a single login attempt.
///
/// Taken by value by the authenticator so the password is dropped, and
/// zeroized by `secrecy`, as soon as the directory bind returns.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }
}
