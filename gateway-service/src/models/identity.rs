//! Domain-qualified naming of application groups and their secrets.
//!
//! An application group is the unit authorization is decided on. Its raw
//! name is `org_assembly_env`, optionally prefixed with a domain token
//! (`domain_org_assembly_env`). Secrets are stored upstream under a globally
//! unique name `{domain}_{group}@{short_name}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::services::GatewayError;

const GROUP_PATTERN: &str = "org_assembly_env or domain_org_assembly_env";

/// Management domain a group or principal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuthDomain {
    Prod,
    Stg,
    Dev,
    Mgmt,
    MsProd,
    MsStg,
    MsDev,
    TenantProd,
    TenantStg,
    TenantDev,
}

impl AuthDomain {
    pub const ALL: [AuthDomain; 10] = [
        AuthDomain::Prod,
        AuthDomain::Stg,
        AuthDomain::Dev,
        AuthDomain::Mgmt,
        AuthDomain::MsProd,
        AuthDomain::MsStg,
        AuthDomain::MsDev,
        AuthDomain::TenantProd,
        AuthDomain::TenantStg,
        AuthDomain::TenantDev,
    ];

    /// Canonical token: lowercase, `-` separated.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthDomain::Prod => "prod",
            AuthDomain::Stg => "stg",
            AuthDomain::Dev => "dev",
            AuthDomain::Mgmt => "mgmt",
            AuthDomain::MsProd => "ms-prod",
            AuthDomain::MsStg => "ms-stg",
            AuthDomain::MsDev => "ms-dev",
            AuthDomain::TenantProd => "tenant-prod",
            AuthDomain::TenantStg => "tenant-stg",
            AuthDomain::TenantDev => "tenant-dev",
        }
    }
}

impl fmt::Display for AuthDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthDomain {
    type Err = GatewayError;

    /// Case-insensitive; `_` and `-` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        AuthDomain::ALL
            .into_iter()
            .find(|d| d.as_str() == normalized)
            .ok_or_else(|| {
                GatewayError::InvalidFormat(format!(
                    "Unknown domain '{}', expected one of: {}",
                    s,
                    AuthDomain::ALL.map(|d| d.as_str()).join(", ")
                ))
            })
    }
}

impl TryFrom<String> for AuthDomain {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AuthDomain> for String {
    fn from(domain: AuthDomain) -> Self {
        domain.as_str().to_string()
    }
}

/// A parsed application group ("environment").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppGroup {
    domain: AuthDomain,
    name: String,
    org: Option<String>,
    assembly: Option<String>,
    env: Option<String>,
}

impl AppGroup {
    /// Parses a group name taken from a request path.
    ///
    /// Exactly three segments keep the caller's domain. More than three means
    /// the first segment is a domain token that overrides `domain`; an
    /// unknown token is rejected rather than treated as an org. Anything
    /// else is `InvalidFormat`.
    pub fn parse(domain: AuthDomain, raw: &str) -> Result<Self, GatewayError> {
        let segments: Vec<&str> = raw.split('_').collect();

        match segments.len() {
            3 if segments.iter().all(|s| !s.trim().is_empty()) => {
                Ok(Self::from_name(domain, raw.to_string()))
            }
            n if n > 3 => {
                let domain = segments[0].parse::<AuthDomain>().map_err(|e| {
                    GatewayError::InvalidFormat(format!(
                        "Invalid application group '{}': {}; expected {}",
                        raw, e, GROUP_PATTERN
                    ))
                })?;
                Ok(Self::from_name(domain, segments[1..].join("_")))
            }
            _ => Err(GatewayError::InvalidFormat(format!(
                "Invalid application group '{}', expected {}",
                raw, GROUP_PATTERN
            ))),
        }
    }

    /// Builds a group from an already domain-stripped name. Never fails:
    /// names that do not split into three non-blank segments keep only the
    /// raw name.
    pub fn from_name(domain: AuthDomain, name: String) -> Self {
        let segments: Vec<&str> = name.split('_').collect();
        let (org, assembly, env) = match segments.as_slice() {
            [org, assembly, env] if segments.iter().all(|s| !s.trim().is_empty()) => (
                Some(org.to_string()),
                Some(assembly.to_string()),
                Some(env.to_string()),
            ),
            _ => (None, None, None),
        };

        Self {
            domain,
            name,
            org,
            assembly,
            env,
        }
    }

    pub fn domain(&self) -> AuthDomain {
        self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn org(&self) -> Option<&str> {
        self.org.as_deref()
    }

    pub fn assembly(&self) -> Option<&str> {
        self.assembly.as_deref()
    }

    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    /// `/{domain}/{org}/{assembly}/{env}` with every segment percent-encoded,
    /// or `/{domain}/{name}` when the name was not decomposed.
    pub fn canonical_path(&self) -> String {
        match (&self.org, &self.assembly, &self.env) {
            (Some(org), Some(assembly), Some(env)) => format!(
                "/{}/{}/{}/{}",
                self.domain,
                urlencoding::encode(org),
                urlencoding::encode(assembly),
                urlencoding::encode(env)
            ),
            _ => format!("/{}/{}", self.domain, urlencoding::encode(&self.name)),
        }
    }

    /// Domain-qualified name used for the group in the secrets store.
    pub fn qualified_name(&self) -> String {
        format!("{}_{}", self.domain, self.name)
    }
}

impl fmt::Display for AppGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_path())
    }
}

/// A secret as the user sees it: a short name inside one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSecret {
    short_name: String,
    group: AppGroup,
}

impl AppSecret {
    pub fn new(short_name: &str, group: AppGroup) -> Result<Self, GatewayError> {
        if short_name.trim().is_empty() || short_name.contains('@') {
            return Err(GatewayError::InvalidFormat(format!(
                "Invalid secret name '{}', must be non-blank and must not contain '@'",
                short_name
            )));
        }

        Ok(Self {
            short_name: short_name.to_string(),
            group,
        })
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn group(&self) -> &AppGroup {
        &self.group
    }

    /// `{domain}_{group}@{short_name}`; the secrets store needs names that
    /// are unique across all groups.
    pub fn unique_name(&self) -> String {
        format!("{}@{}", self.group.qualified_name(), self.short_name)
    }

    /// Inverse of [`AppSecret::unique_name`].
    pub fn from_unique_name(unique_name: &str) -> Result<Self, GatewayError> {
        let invalid = || {
            GatewayError::InvalidFormat(format!(
                "Invalid unique secret name '{}', expected domain_group@name",
                unique_name
            ))
        };

        let (qualified_group, short_name) = unique_name.rsplit_once('@').ok_or_else(invalid)?;
        let (domain, group_name) = qualified_group.split_once('_').ok_or_else(invalid)?;
        if group_name.is_empty() {
            return Err(invalid());
        }

        let domain = domain.parse::<AuthDomain>().map_err(|_| invalid())?;
        let group = AppGroup::from_name(domain, group_name.to_string());
        AppSecret::new(short_name, group)
    }
}
