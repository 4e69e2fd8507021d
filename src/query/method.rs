//! Retrieval methods a collection can be queried with.

use std::fmt;
use std::str::FromStr;

use crate::error::CacherError;

/// The fixed set of cacheable retrieval methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Find,
    FindOne,
    FindAll,
    FindAndCount,
    FindAndCountAll,
    All,
    Min,
    Max,
    Sum,
    Count,
}

impl Method {
    /// Every supported method, in declaration order.
    pub const ALL: [Method; 10] = [
        Self::Find,
        Self::FindOne,
        Self::FindAll,
        Self::FindAndCount,
        Self::FindAndCountAll,
        Self::All,
        Self::Min,
        Self::Max,
        Self::Sum,
        Self::Count,
    ];

    /// Name used in cache keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::FindOne => "findOne",
            Self::FindAll => "findAll",
            Self::FindAndCount => "findAndCount",
            Self::FindAndCountAll => "findAndCountAll",
            Self::All => "all",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Count => "count",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CacherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| CacherError::InvalidMethod(s.to_string()))
    }
}
