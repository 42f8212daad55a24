//! Placement scores — integers extended with ±infinity sentinels.
//!
//! A score of `MinusInf` on a node bans placement there; `PlusInf` on a
//! colocation edge makes the colocation mandatory. Addition saturates:
//! a ban always wins, so `-∞ + x = -∞` for every `x`, including `+∞`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A placement preference in ℤ ∪ {−∞, +∞}.
///
/// The derived ordering is total: `MinusInf < Finite(i32::MIN) <= ... <=
/// Finite(i32::MAX) < PlusInf`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Score {
    MinusInf,
    Finite(i32),
    PlusInf,
}

impl Score {
    pub const ZERO: Score = Score::Finite(0);

    /// Saturating addition. A `MinusInf` operand dominates everything,
    /// then `PlusInf`; finite overflow saturates into the infinities.
    pub fn plus(self, other: Score) -> Score {
        match (self, other) {
            (Score::MinusInf, _) | (_, Score::MinusInf) => Score::MinusInf,
            (Score::PlusInf, _) | (_, Score::PlusInf) => Score::PlusInf,
            (Score::Finite(a), Score::Finite(b)) => match a.checked_add(b) {
                Some(sum) => Score::Finite(sum),
                None if a > 0 => Score::PlusInf,
                None => Score::MinusInf,
            },
        }
    }

    pub fn is_negative(self) -> bool {
        self < Score::ZERO
    }

    pub fn is_minus_inf(self) -> bool {
        self == Score::MinusInf
    }
}

impl Default for Score {
    fn default() -> Self {
        Score::ZERO
    }
}

impl From<i32> for Score {
    fn from(value: i32) -> Self {
        Score::Finite(value)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::MinusInf => f.write_str("-INFINITY"),
            Score::PlusInf => f.write_str("INFINITY"),
            Score::Finite(v) => write!(f, "{v}"),
        }
    }
}
