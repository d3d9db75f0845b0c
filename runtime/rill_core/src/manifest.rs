//! Module manifests.
//!
//! A module declares at its head the permissions it requires, the
//! parameters it accepts, its resource limits, the hosts it provides and
//! optional database resolution data. The runtime validates the manifest
//! against the parent context before execution starts.

use rill_ir::ManifestSpec;
use rill_values::Pattern;

use crate::context::Context;
use crate::limits::{Limit, LimitKind};
use crate::permission::{Permission, PermissionError};
use crate::risk::{compute_program_risk_score, RiskScore};

/// A resolved manifest parameter.
#[derive(Clone, Debug)]
pub struct ManifestParam {
    /// `None` for positional parameters.
    pub name: Option<String>,
    pub pattern: Pattern,
}

/// A resolved module manifest.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    pub permissions: Vec<Permission>,
    pub parameters: Vec<ManifestParam>,
    pub limits: Vec<Limit>,
    pub provided_hosts: Vec<String>,
    pub databases: Vec<(String, String)>,
}

/// Manifest resolution/validation failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error("unknown pattern `{0}` in manifest parameter")]
    UnknownPattern(String),
}

impl Manifest {
    /// Resolve an embedder-provided [`ManifestSpec`].
    ///
    /// `resolve_pattern` maps manifest pattern names to concrete patterns
    /// (usually the spawner context's named patterns).
    pub fn from_spec(
        spec: &ManifestSpec,
        resolve_pattern: impl Fn(&str) -> Option<Pattern>,
    ) -> Result<Manifest, ManifestError> {
        let mut permissions = Vec::with_capacity(spec.permissions.len());
        for permission_spec in &spec.permissions {
            permissions.push(Permission::from_spec(permission_spec)?);
        }
        let mut parameters = Vec::with_capacity(spec.parameters.len());
        for param in &spec.parameters {
            let pattern = resolve_pattern(&param.pattern)
                .ok_or_else(|| ManifestError::UnknownPattern(param.pattern.clone()))?;
            parameters.push(ManifestParam {
                name: param.name.clone(),
                pattern,
            });
        }
        let limits = spec
            .limits
            .iter()
            .map(|l| Limit {
                name: l.name.clone(),
                kind: match l.refill_per_second {
                    Some(per_second) => LimitKind::Rate { per_second },
                    None => LimitKind::Total,
                },
                capacity: l.amount,
            })
            .collect();
        Ok(Manifest {
            permissions,
            parameters,
            limits,
            provided_hosts: spec.provided_hosts.clone(),
            databases: spec.databases.clone(),
        })
    }

    /// Check that every required permission is covered by `parent`.
    pub fn validate_against(&self, parent: &Context) -> Result<(), PermissionError> {
        for permission in &self.permissions {
            parent.check_permission(permission)?;
        }
        Ok(())
    }

    /// Risk score of the required-permission set.
    pub fn risk_score(&self) -> RiskScore {
        compute_program_risk_score(&self.permissions)
    }
}
