//! Relational operator placeholders.

use std::fmt;

/// Operator placeholder used inside query options, either as a map key
/// (`{ Op::Or: [...] }`) or as a value.
///
/// Each operator has a stable string label so keys derived from options
/// containing operators are deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
    NotLike,
    ILike,
    Between,
    NotBetween,
    Is,
    Not,
    And,
    Or,
}

impl Op {
    /// Stable label used when canonicalizing options.
    pub fn label(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::NotIn => "$notIn",
            Self::Like => "$like",
            Self::NotLike => "$notLike",
            Self::ILike => "$iLike",
            Self::Between => "$between",
            Self::NotBetween => "$notBetween",
            Self::Is => "$is",
            Self::Not => "$not",
            Self::And => "$and",
            Self::Or => "$or",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
