use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Requested transaction isolation.
///
/// `Unspecified` defers to whoever opens the transaction: the editor's
/// configured default first, then the store's own default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    #[default]
    Unspecified,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
}

impl IsolationLevel {
    pub fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified)
    }

    /// Whether commit must reject writes to records that changed after
    /// the transaction first read them.
    pub fn detects_write_conflicts(&self) -> bool {
        matches!(self, Self::RepeatableRead | Self::Snapshot | Self::Serializable)
    }

    /// `self`, or `fallback` when `self` is unspecified.
    pub fn or(self, fallback: IsolationLevel) -> IsolationLevel {
        if self.is_unspecified() { fallback } else { self }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Snapshot => "SNAPSHOT",
            Self::Serializable => "SERIALIZABLE",
        };
        f.write_str(name)
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "" | "unspecified" => Ok(Self::Unspecified),
            "readuncommitted" => Ok(Self::ReadUncommitted),
            "readcommitted" => Ok(Self::ReadCommitted),
            "repeatableread" => Ok(Self::RepeatableRead),
            "snapshot" => Ok(Self::Snapshot),
            "serializable" => Ok(Self::Serializable),
            _ => Err(format!("Unknown isolation level '{}'", s)),
        }
    }
}
