//! Permissions and the pattern-covers-pattern inclusion logic.
//!
//! A permission is a `(kind, entity)` tuple from a closed set of families.
//! The kernel decision is [`Context::has_permission`](crate::Context):
//! some granted permission includes the requested one AND no forbidden
//! permission includes it.

use std::fmt;

use rill_ir::PermissionSpec;

/// The closed set of permission kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    Read,
    Write,
    Update,
    Delete,
    Use,
    Create,
    Provide,
}

impl PermissionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(PermissionKind::Read),
            "write" => Some(PermissionKind::Write),
            "update" => Some(PermissionKind::Update),
            "delete" => Some(PermissionKind::Delete),
            "use" => Some(PermissionKind::Use),
            "create" => Some(PermissionKind::Create),
            "provide" => Some(PermissionKind::Provide),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            PermissionKind::Read => "read",
            PermissionKind::Write => "write",
            PermissionKind::Update => "update",
            PermissionKind::Delete => "delete",
            PermissionKind::Use => "use",
            PermissionKind::Create => "create",
            PermissionKind::Provide => "provide",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entity of a filesystem permission.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FsEntity {
    Path(String),
    /// Glob pattern: `*` within a segment, `**` across segments.
    Pattern(String),
    Any,
}

/// Entity of an HTTP permission.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HttpEntity {
    Url(String),
    /// URL pattern, e.g. `https://example.com/api/**`.
    UrlPattern(String),
    /// Host, e.g. `https://example.com`.
    Host(String),
    /// Host pattern, e.g. `https://*.example.com`.
    HostPattern(String),
    Any,
}

/// Entity of a global-variable permission.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GlobalVarEntity {
    Name(String),
    Any,
}

/// A capability: `(kind, entity)` within one of the closed families.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    Filesystem { kind: PermissionKind, entity: FsEntity },
    Http { kind: PermissionKind, entity: HttpEntity },
    Database { kind: PermissionKind, host: String },
    /// Creation of LThreads; the only kind is `create`.
    LThreadCreate,
    GlobalVar { kind: PermissionKind, entity: GlobalVarEntity },
    /// Use of an external command.
    CommandUse { name: String },
}

/// Errors of the permission kernel.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("not allowed: {0}")]
    NotAllowed(Permission),
    #[error("invalid permission description: {0}")]
    InvalidSpec(String),
}

impl Permission {
    pub fn kind(&self) -> PermissionKind {
        match self {
            Permission::Filesystem { kind, .. }
            | Permission::Http { kind, .. }
            | Permission::Database { kind, .. }
            | Permission::GlobalVar { kind, .. } => *kind,
            Permission::LThreadCreate => PermissionKind::Create,
            Permission::CommandUse { .. } => PermissionKind::Use,
        }
    }

    /// Pattern-covers-pattern inclusion: does `self` grant everything
    /// `other` grants?
    pub fn includes(&self, other: &Permission) -> bool {
        match (self, other) {
            (
                Permission::Filesystem { kind, entity },
                Permission::Filesystem {
                    kind: other_kind,
                    entity: other_entity,
                },
            ) => kind == other_kind && fs_entity_includes(entity, other_entity),
            (
                Permission::Http { kind, entity },
                Permission::Http {
                    kind: other_kind,
                    entity: other_entity,
                },
            ) => kind == other_kind && http_entity_includes(entity, other_entity),
            (
                Permission::Database { kind, host },
                Permission::Database {
                    kind: other_kind,
                    host: other_host,
                },
            ) => kind == other_kind && host == other_host,
            (Permission::LThreadCreate, Permission::LThreadCreate) => true,
            (
                Permission::GlobalVar { kind, entity },
                Permission::GlobalVar {
                    kind: other_kind,
                    entity: other_entity,
                },
            ) => {
                kind == other_kind
                    && match (entity, other_entity) {
                        (GlobalVarEntity::Any, _) => true,
                        (GlobalVarEntity::Name(a), GlobalVarEntity::Name(b)) => a == b,
                        (GlobalVarEntity::Name(_), GlobalVarEntity::Any) => false,
                    }
            }
            (Permission::CommandUse { name }, Permission::CommandUse { name: other_name }) => {
                name == other_name
            }
            _ => false,
        }
    }

    /// Parse an embedder-provided [`PermissionSpec`].
    pub fn from_spec(spec: &PermissionSpec) -> Result<Permission, PermissionError> {
        let kind = PermissionKind::parse(&spec.kind)
            .ok_or_else(|| PermissionError::InvalidSpec(format!("unknown kind `{}`", spec.kind)))?;
        match spec.family.as_str() {
            "fs" => {
                let entity = if spec.entity == "*" {
                    FsEntity::Any
                } else if spec.entity.contains('*') {
                    FsEntity::Pattern(spec.entity.clone())
                } else {
                    FsEntity::Path(spec.entity.clone())
                };
                Ok(Permission::Filesystem { kind, entity })
            }
            "http" => {
                let entity = if spec.entity == "*" {
                    HttpEntity::Any
                } else {
                    classify_http_entity(&spec.entity)
                };
                Ok(Permission::Http { kind, entity })
            }
            "db" => Ok(Permission::Database {
                kind,
                host: spec.entity.clone(),
            }),
            "lthread" => {
                if kind == PermissionKind::Create {
                    Ok(Permission::LThreadCreate)
                } else {
                    Err(PermissionError::InvalidSpec(
                        "lthread permissions only support `create`".to_owned(),
                    ))
                }
            }
            "globalvar" => {
                let entity = if spec.entity == "*" {
                    GlobalVarEntity::Any
                } else {
                    GlobalVarEntity::Name(spec.entity.clone())
                };
                Ok(Permission::GlobalVar { kind, entity })
            }
            "cmd" => Ok(Permission::CommandUse {
                name: spec.entity.clone(),
            }),
            other => Err(PermissionError::InvalidSpec(format!(
                "unknown permission family `{other}`"
            ))),
        }
    }
}

/// Classify an HTTP entity string by its shape.
///
/// A URL has a path component after the host; a pattern contains `*`.
fn classify_http_entity(entity: &str) -> HttpEntity {
    let after_scheme = entity
        .find("://")
        .map_or(entity, |i| &entity[i + 3..]);
    let has_path = after_scheme.contains('/');
    match (entity.contains('*'), has_path) {
        (true, true) => HttpEntity::UrlPattern(entity.to_owned()),
        (true, false) => HttpEntity::HostPattern(entity.to_owned()),
        (false, true) => HttpEntity::Url(entity.to_owned()),
        (false, false) => HttpEntity::Host(entity.to_owned()),
    }
}

fn fs_entity_includes(grantor: &FsEntity, requested: &FsEntity) -> bool {
    match (grantor, requested) {
        (FsEntity::Any, _) => true,
        (FsEntity::Path(a), FsEntity::Path(b)) => a == b,
        (FsEntity::Pattern(p), FsEntity::Path(path)) => glob_match(p, path),
        (FsEntity::Pattern(a), FsEntity::Pattern(b)) => a == b || pattern_covers_pattern(a, b),
        _ => false,
    }
}

fn http_entity_includes(grantor: &HttpEntity, requested: &HttpEntity) -> bool {
    match (grantor, requested) {
        (HttpEntity::Any, _) => true,
        (HttpEntity::Url(a), HttpEntity::Url(b)) => a == b,
        (HttpEntity::UrlPattern(p), HttpEntity::Url(u)) => glob_match(p, u),
        (HttpEntity::UrlPattern(a), HttpEntity::UrlPattern(b)) => {
            a == b || pattern_covers_pattern(a, b)
        }
        // A host covers every URL under it.
        (HttpEntity::Host(h), HttpEntity::Url(u)) => {
            u.strip_prefix(h.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        }
        (HttpEntity::Host(a), HttpEntity::Host(b)) => a == b,
        (HttpEntity::HostPattern(p), HttpEntity::Host(h)) => glob_match(p, h),
        (HttpEntity::HostPattern(a), HttpEntity::HostPattern(b)) => a == b,
        (HttpEntity::HostPattern(p), HttpEntity::Url(u)) => {
            let host_end = u
                .find("://")
                .map(|i| i + 3)
                .and_then(|start| u[start..].find('/').map(|j| start + j))
                .unwrap_or(u.len());
            glob_match(p, &u[..host_end])
        }
        _ => false,
    }
}

/// Conservative pattern-covers-pattern check: `a` covers `b` when `b`'s
/// literal prefix (up to its first wildcard) matches `a`.
fn pattern_covers_pattern(a: &str, b: &str) -> bool {
    let prefix = &b[..b.find('*').unwrap_or(b.len())];
    // `a` must accept every expansion of `b`; checking the literal prefix
    // against `a` with a `**` tail is sufficient for the supported shapes.
    glob_match(a, prefix.trim_end_matches('/'))
        || a.strip_suffix("**")
            .is_some_and(|a_prefix| prefix.starts_with(a_prefix))
}

/// Glob matching with `*` (within a path segment) and `**` (any depth).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[char], t: &[char]) -> bool {
        match p.split_first() {
            None => t.is_empty(),
            Some(('*', rest)) if rest.first() == Some(&'*') => {
                // `**` matches any run of characters, including `/`.
                let rest = &rest[1..];
                (0..=t.len()).any(|i| inner(rest, &t[i..]))
            }
            Some(('*', rest)) => {
                // `*` stops at segment boundaries.
                (0..=t.len())
                    .take_while(|i| t[..*i].iter().all(|c| *c != '/'))
                    .any(|i| inner(rest, &t[i..]))
            }
            Some((c, rest)) => t.split_first().is_some_and(|(tc, tr)| tc == c && inner(rest, tr)),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    inner(&p, &t)
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Filesystem { kind, entity } => {
                let entity = match entity {
                    FsEntity::Path(p) | FsEntity::Pattern(p) => p.as_str(),
                    FsEntity::Any => "*",
                };
                write!(f, "{kind} {entity}")
            }
            Permission::Http { kind, entity } => {
                let entity = match entity {
                    HttpEntity::Url(e)
                    | HttpEntity::UrlPattern(e)
                    | HttpEntity::Host(e)
                    | HttpEntity::HostPattern(e) => e.as_str(),
                    HttpEntity::Any => "*",
                };
                write!(f, "{kind} {entity}")
            }
            Permission::Database { kind, host } => write!(f, "{kind} db {host}"),
            Permission::LThreadCreate => write!(f, "create lthreads"),
            Permission::GlobalVar { kind, entity } => {
                let entity = match entity {
                    GlobalVarEntity::Name(n) => n.as_str(),
                    GlobalVarEntity::Any => "*",
                };
                write!(f, "{kind} global ${entity}")
            }
            Permission::CommandUse { name } => write!(f, "use command {name}"),
        }
    }
}
