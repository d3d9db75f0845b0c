//! Risk scoring for required-permission sets.
//!
//! Each permission family maps `(kind, entity)` to a base score multiplied
//! by an entity-sensitivity factor. Scores are summed within a family and
//! the per-family sums are multiplied together, capped at
//! [`MAXIMUM_RISK_SCORE`]. The constants are a starting point and may be
//! adjusted based on additional research and feedback.

use crate::permission::{glob_match, FsEntity, HttpEntity, Permission, PermissionKind};

/// A computed risk score.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RiskScore(pub u32);

pub const MAXIMUM_RISK_SCORE: RiskScore = RiskScore(10_000);
pub const MEDIUM_RISK_SCORE_LEVEL: u32 = 300;
pub const HIGH_RISK_SCORE_LEVEL: u32 = 500;
const UNKNOWN_PERM_RISK_SCORE: u32 = 30;

const HOST_PATTERN_RISK_MULTIPLIER: u32 = 4;
const HOST_RISK_MULTIPLIER: u32 = 3;
const URL_PATTERN_RISK_MULTIPLIER: u32 = 2;
const URL_RISK_MULTIPLIER: u32 = 1;

const UNKNOWN_FILE_SENSITIVITY_MULTIPLIER: u32 = 2;
const UNKNOWN_FILE_PATTERN_SENSITIVITY_MULTIPLIER: u32 = 3;

const HTTP_READ_PERM_RISK_SCORE: u32 = 10;
const HTTP_WRITE_PERM_RISK_SCORE: u32 = 20;
const FS_READ_PERM_RISK_SCORE: u32 = 10;
const FS_WRITE_PERM_RISK_SCORE: u32 = 20;
// Creating an lthread is not risky by itself; the thread count limit is
// what matters.
const LTHREAD_PERM_RISK_SCORE: u32 = 2;
const CMD_PERM_RISK_SCORE: u32 = 30;

/// Sensitivity multipliers for well-known path shapes.
const FILE_SENSITIVITY_MULTIPLIERS: &[(&str, u32)] = &[
    ("/home/*/.*", 3),
    ("/home/*/.*/**", 3),
    ("/etc/**", 3),
    ("/usr/**", 4),
    ("/bin/**", 4),
    ("/sbin/**", 4),
    ("/*", 4),
];

impl RiskScore {
    /// Render the value with its level, e.g. `520 (high)`.
    pub fn value_and_level(self) -> String {
        let level = if self.0 >= HIGH_RISK_SCORE_LEVEL {
            "high"
        } else if self.0 >= MEDIUM_RISK_SCORE_LEVEL {
            "medium"
        } else {
            "low"
        };
        format!("{} ({level})", self.0)
    }
}

/// Risk family used for the sum-within / multiply-across aggregation.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
enum RiskFamily {
    Http,
    Fs,
    LThread,
    Command,
    Database,
}

fn family_of(permission: &Permission) -> Option<RiskFamily> {
    match permission {
        Permission::Http { .. } => Some(RiskFamily::Http),
        Permission::Filesystem { .. } => Some(RiskFamily::Fs),
        Permission::LThreadCreate => Some(RiskFamily::LThread),
        Permission::CommandUse { .. } => Some(RiskFamily::Command),
        Permission::Database { .. } => Some(RiskFamily::Database),
        // Global-variable permissions are ignored by program scoring.
        Permission::GlobalVar { .. } => None,
    }
}

/// Risk score of a whole required-permission set.
///
/// Scores of permissions of the same family are summed, then the family
/// sums are multiplied together; the result is capped at
/// [`MAXIMUM_RISK_SCORE`].
pub fn compute_program_risk_score(required: &[Permission]) -> RiskScore {
    let mut family_scores: Vec<(RiskFamily, u32)> = Vec::new();
    for permission in required {
        let Some(family) = family_of(permission) else {
            continue;
        };
        let score = compute_permission_risk_score(permission).0;
        match family_scores.iter_mut().find(|(f, _)| *f == family) {
            Some((_, sum)) => *sum = sum.saturating_add(score),
            None => family_scores.push((family, score)),
        }
    }

    let mut total: u32 = 1;
    for (_, score) in family_scores {
        if score == 0 {
            continue;
        }
        if total > MAXIMUM_RISK_SCORE.0 / score {
            return MAXIMUM_RISK_SCORE;
        }
        total *= score;
    }
    RiskScore(total.min(MAXIMUM_RISK_SCORE.0))
}

/// Risk score of a single permission.
pub fn compute_permission_risk_score(permission: &Permission) -> RiskScore {
    let score = match permission {
        Permission::GlobalVar { .. } => 1,
        Permission::LThreadCreate => LTHREAD_PERM_RISK_SCORE,
        Permission::CommandUse { .. } => CMD_PERM_RISK_SCORE,
        Permission::Database { kind, .. } => match kind {
            PermissionKind::Read => HTTP_READ_PERM_RISK_SCORE,
            _ => HTTP_WRITE_PERM_RISK_SCORE,
        },
        Permission::Http { kind, entity } => {
            let base = match kind {
                PermissionKind::Read => HTTP_READ_PERM_RISK_SCORE,
                _ => HTTP_WRITE_PERM_RISK_SCORE,
            };
            let multiplier = match entity {
                HttpEntity::HostPattern(_) | HttpEntity::Any => HOST_PATTERN_RISK_MULTIPLIER,
                HttpEntity::Host(_) => HOST_RISK_MULTIPLIER,
                HttpEntity::UrlPattern(_) => URL_PATTERN_RISK_MULTIPLIER,
                HttpEntity::Url(_) => URL_RISK_MULTIPLIER,
            };
            base * multiplier
        }
        Permission::Filesystem { kind, entity } => {
            let base = match kind {
                PermissionKind::Read => FS_READ_PERM_RISK_SCORE,
                _ => FS_WRITE_PERM_RISK_SCORE,
            };
            let multiplier = match entity {
                FsEntity::Path(path) => path_sensitivity_multiplier(path),
                FsEntity::Pattern(pattern) => path_pattern_sensitivity_multiplier(pattern),
                FsEntity::Any => UNKNOWN_FILE_PATTERN_SENSITIVITY_MULTIPLIER,
            };
            base * multiplier
        }
    };
    if score == 0 {
        RiskScore(UNKNOWN_PERM_RISK_SCORE)
    } else {
        RiskScore(score)
    }
}

fn path_sensitivity_multiplier(path: &str) -> u32 {
    for (pattern, multiplier) in FILE_SENSITIVITY_MULTIPLIERS {
        if glob_match(pattern, path) {
            return *multiplier;
        }
    }
    UNKNOWN_FILE_SENSITIVITY_MULTIPLIER
}

fn path_pattern_sensitivity_multiplier(pattern: &str) -> u32 {
    let mut max = UNKNOWN_FILE_PATTERN_SENSITIVITY_MULTIPLIER;
    for (known, multiplier) in FILE_SENSITIVITY_MULTIPLIERS {
        if known == &pattern {
            max = max.max(*multiplier);
        }
    }
    max
}
