//! User records and the compound keys they are assembled from
//!
//! Keys in the flat store have the form `<id>.<attribute>`, e.g. `5.xp`.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Per-user attributes known to the migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Xp,
    Level,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Xp => "xp",
            Attribute::Level => "level",
        }
    }

    pub fn all() -> &'static [Attribute] {
        &[Attribute::Xp, Attribute::Level]
    }
}

impl FromStr for Attribute {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "xp" => Ok(Attribute::Xp),
            "level" => Ok(Attribute::Level),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A key split into user id and attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompoundKey {
    pub id: i64,
    pub attribute: Attribute,
}

impl CompoundKey {
    pub fn new(id: i64, attribute: Attribute) -> Self {
        Self { id, attribute }
    }

    /// Split `key` at its last `.`.
    ///
    /// Returns `None` unless the prefix is a decimal i64 and the suffix a
    /// known attribute.
    pub fn parse(key: &str) -> Option<Self> {
        let (id, attribute) = key.rsplit_once('.')?;
        let attribute = attribute.parse().ok()?;
        let id = id.parse().ok()?;
        Some(Self { id, attribute })
    }
}

impl fmt::Display for CompoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.attribute)
    }
}

/// A fully assembled user, ready for the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    /// External user id
    pub id: i64,
    pub experience: i64,
    pub level: i32,
}

impl UserRecord {
    pub fn new(id: i64, experience: i64, level: i32) -> Self {
        Self { id, experience, level }
    }
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User(id={}, level={}, xp={})", self.id, self.level, self.experience)
    }
}
