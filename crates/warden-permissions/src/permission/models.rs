//! Permission data models
//!
//! A permission is the triple `resource:action:scope`. Each segment is either
//! a literal made of `[A-Za-z0-9_.-]` or the wildcard `*`. Scopes are a closed,
//! totally ordered set: `own < organization < all`, with `*` ranking as `all`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PermissionError, Result};

const WILDCARD: &str = "*";

/// Resource or action segment of a permission
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// `*`: on the granted side matches any value
    Any,
    Literal(String),
}

impl Segment {
    fn parse(input: &str, raw: &str, position: &str) -> Result<Self> {
        if raw == WILDCARD {
            return Ok(Segment::Any);
        }
        validate_literal(input, raw, position)?;
        Ok(Segment::Literal(raw.to_string()))
    }

    /// Check whether this granted segment covers the requested one.
    ///
    /// A requested `*` is only covered by a granted `*`.
    pub fn covers(&self, requested: &Segment) -> bool {
        match (self, requested) {
            (Segment::Any, _) => true,
            (Segment::Literal(granted), Segment::Literal(wanted)) => granted == wanted,
            (Segment::Literal(_), Segment::Any) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Segment::Any => WILDCARD,
            Segment::Literal(value) => value,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope segment of a permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Records owned by the principal
    Own,
    /// Records belonging to the principal's organization
    Organization,
    /// Every record
    All,
    /// `*`, ranks the same as `All`
    Any,
}

impl Scope {
    /// Position in the scope order; a broader scope has a higher rank
    pub fn rank(self) -> u8 {
        match self {
            Scope::Own => 0,
            Scope::Organization => 1,
            Scope::All | Scope::Any => 2,
        }
    }

    /// Check whether a grant at this scope satisfies a request at `requested`
    pub fn satisfies(self, requested: Scope) -> bool {
        self.rank() >= requested.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Own => "own",
            Scope::Organization => "organization",
            Scope::All => "all",
            Scope::Any => WILDCARD,
        }
    }

    fn parse(input: &str, raw: &str) -> Result<Self> {
        match raw {
            "own" => Ok(Scope::Own),
            "organization" => Ok(Scope::Organization),
            "all" => Ok(Scope::All),
            WILDCARD => Ok(Scope::Any),
            other => {
                validate_literal(input, other, "scope")?;
                Err(PermissionError::malformed(
                    input,
                    format!("unknown scope '{other}', expected own, organization, all or *"),
                ))
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn validate_literal(input: &str, raw: &str, position: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(PermissionError::malformed(input, format!("empty {position} segment")));
    }
    if let Some(bad) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(PermissionError::malformed(
            input,
            format!("invalid character {bad:?} in {position} segment"),
        ));
    }
    Ok(())
}

/// Validated `resource:action:scope` permission.
///
/// Invalid strings never produce a value, so anything holding a `Permission`
/// may rely on the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    resource: Segment,
    action: Segment,
    scope: Scope,
}

impl Permission {
    /// Parse a permission string
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = input.split(':');
        let (Some(resource), Some(action), Some(scope), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(PermissionError::malformed(
                input,
                "expected exactly three ':'-separated segments",
            ));
        };

        Ok(Self {
            resource: Segment::parse(input, resource, "resource")?,
            action: Segment::parse(input, action, "action")?,
            scope: Scope::parse(input, scope)?,
        })
    }

    pub fn resource(&self) -> &Segment {
        &self.resource
    }

    pub fn action(&self) -> &Segment {
        &self.action
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Check whether this permission, held as a grant, satisfies `requested`
    pub fn grants(&self, requested: &Permission) -> bool {
        self.resource.covers(&requested.resource)
            && self.action.covers(&requested.action)
            && self.scope.satisfies(requested.scope)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.resource, self.action, self.scope)
    }
}

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self> {
        Permission::parse(s)
    }
}

impl TryFrom<&str> for Permission {
    type Error = PermissionError;

    fn try_from(value: &str) -> Result<Self> {
        Permission::parse(value)
    }
}

impl TryFrom<String> for Permission {
    type Error = PermissionError;

    fn try_from(value: String) -> Result<Self> {
        Permission::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(permission: Permission) -> Self {
        permission.to_string()
    }
}
