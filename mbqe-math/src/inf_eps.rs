//! Extended Reals with Infinitesimals.
//!
//! [`InfEps`] represents values of the form `r + k·ε + j·∞` with `r` an
//! arbitrary-precision rational and `k, j ∈ {−1, 0, +1}`. Objective
//! maximization returns such a value: a plain rational when the optimum is
//! attained, `r − ε` when the optimum is a supremum excluded by a strict
//! bound, and `+∞` when the objective is unbounded above.

use num_rational::BigRational;
use num_traits::Zero;
use std::cmp::Ordering;
use std::fmt;

/// Extended rational `r + k·ε + j·∞`.
///
/// Ordering is lexicographic in (infinite part, rational part,
/// infinitesimal part), so `r − ε < r < r + ε` and any finite value is
/// below `+∞`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfEps {
    /// Sign of the infinite part.
    infinite: i8,
    /// Finite rational part.
    rational: BigRational,
    /// Sign of the infinitesimal part.
    eps: i8,
}

impl InfEps {
    /// A finite rational value.
    pub fn finite(rational: BigRational) -> Self {
        Self {
            infinite: 0,
            rational,
            eps: 0,
        }
    }

    /// A finite value plus an infinitesimal with sign `eps`.
    pub fn finite_eps(rational: BigRational, eps: i8) -> Self {
        debug_assert!((-1..=1).contains(&eps));
        Self {
            infinite: 0,
            rational,
            eps,
        }
    }

    /// Positive infinity.
    pub fn pos_infinite() -> Self {
        Self {
            infinite: 1,
            rational: BigRational::zero(),
            eps: 0,
        }
    }

    /// Negative infinity.
    pub fn neg_infinite() -> Self {
        Self {
            infinite: -1,
            rational: BigRational::zero(),
            eps: 0,
        }
    }

    /// Zero.
    pub fn zero() -> Self {
        Self::finite(BigRational::zero())
    }

    /// True when the infinite part is absent.
    pub fn is_finite(&self) -> bool {
        self.infinite == 0
    }

    /// Sign of the infinite part.
    pub fn infinite_sign(&self) -> i8 {
        self.infinite
    }

    /// The finite rational part.
    pub fn rational(&self) -> &BigRational {
        &self.rational
    }

    /// Sign of the infinitesimal part.
    pub fn infinitesimal(&self) -> i8 {
        self.eps
    }
}

impl From<BigRational> for InfEps {
    fn from(q: BigRational) -> Self {
        Self::finite(q)
    }
}

impl PartialOrd for InfEps {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InfEps {
    fn cmp(&self, other: &Self) -> Ordering {
        self.infinite
            .cmp(&other.infinite)
            .then_with(|| self.rational.cmp(&other.rational))
            .then_with(|| self.eps.cmp(&other.eps))
    }
}

impl fmt::Display for InfEps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.infinite {
            1 => write!(f, "+oo"),
            -1 => write!(f, "-oo"),
            _ => match self.eps {
                1 => write!(f, "{} + eps", self.rational),
                -1 => write!(f, "{} - eps", self.rational),
                _ => write!(f, "{}", self.rational),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(n.into())
    }

    #[test]
    fn test_ordering() {
        let a = InfEps::finite(q(3));
        let b = InfEps::finite(q(5));
        assert!(a < b);
        assert!(a < InfEps::pos_infinite());
        assert!(InfEps::neg_infinite() < a);
    }

    #[test]
    fn test_eps_ordering() {
        // 3 - eps < 3 < 3 + eps
        let below = InfEps::finite_eps(q(3), -1);
        let exact = InfEps::finite(q(3));
        let above = InfEps::finite_eps(q(3), 1);
        assert!(below < exact);
        assert!(exact < above);
    }

    #[test]
    fn test_display() {
        assert_eq!(InfEps::pos_infinite().to_string(), "+oo");
        assert_eq!(InfEps::finite_eps(q(8), -1).to_string(), "8 - eps");
        assert_eq!(InfEps::finite(q(2)).to_string(), "2");
    }

    #[test]
    fn test_finiteness() {
        assert!(InfEps::zero().is_finite());
        assert!(!InfEps::pos_infinite().is_finite());
        assert_eq!(InfEps::finite_eps(q(1), -1).infinitesimal(), -1);
    }
}
