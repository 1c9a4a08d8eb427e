// Copyright 2026 neurocarto developers
// SPDX-License-Identifier: Apache-2.0

/*!
Resource counts split across the two rows of the neuron-circuit grid.

[`NumberTopBottom`] is the currency of resource accounting: a total circuit
count together with how many of those circuits must sit in the top row and how
many in the bottom row. The unconstrained remainder (`total - top - bottom`)
may land in either row.
*/

use std::cmp::Ordering;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Circuit count with per-row minimums.
///
/// Ordering is componentwise: `a <= b` holds only when every component of `a`
/// is at most the matching component of `b`. Mixed comparisons are unordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumberTopBottom {
    pub total: usize,
    pub top: usize,
    pub bottom: usize,
}

impl NumberTopBottom {
    /// Fails when the row minimums alone exceed the total.
    pub fn new(total: usize, top: usize, bottom: usize) -> ModelResult<Self> {
        if top + bottom > total {
            return Err(ModelError::InvalidResourceSplit { total, top, bottom });
        }
        Ok(Self { total, top, bottom })
    }

    /// Count of a single circuit in row `y` (row 0 is the top row).
    pub fn single(y: usize) -> Self {
        Self {
            total: 1,
            top: usize::from(y == 0),
            bottom: usize::from(y != 0),
        }
    }

    pub const fn zero() -> Self {
        Self { total: 0, top: 0, bottom: 0 }
    }

    /// True when any component of `self` is strictly larger than the matching
    /// component of `other`. This is the "demand not covered" test and is not
    /// the negation of `<=`.
    pub fn exceeds_any(&self, other: &Self) -> bool {
        self.total > other.total || self.top > other.top || self.bottom > other.bottom
    }

    /// Saturating componentwise difference.
    pub fn saturating_sub(&self, other: &Self) -> Self {
        Self {
            total: self.total.saturating_sub(other.total),
            top: self.top.saturating_sub(other.top),
            bottom: self.bottom.saturating_sub(other.bottom),
        }
    }

    /// Componentwise maximum.
    pub fn max(&self, other: &Self) -> Self {
        Self {
            total: self.total.max(other.total),
            top: self.top.max(other.top),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

impl PartialOrd for NumberTopBottom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let cmps = [
            self.total.cmp(&other.total),
            self.top.cmp(&other.top),
            self.bottom.cmp(&other.bottom),
        ];
        if cmps.iter().all(|c| *c != Ordering::Greater) {
            if cmps.iter().all(|c| *c == Ordering::Equal) {
                Some(Ordering::Equal)
            } else {
                Some(Ordering::Less)
            }
        } else if cmps.iter().all(|c| *c != Ordering::Less) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl Add for NumberTopBottom {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            total: self.total + rhs.total,
            top: self.top + rhs.top,
            bottom: self.bottom + rhs.bottom,
        }
    }
}

impl AddAssign for NumberTopBottom {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.top += rhs.top;
        self.bottom += rhs.bottom;
    }
}

impl std::iter::Sum for NumberTopBottom {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, n| acc + n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_rejects_oversized_split() {
        assert!(NumberTopBottom::new(2, 1, 1).is_ok());
        assert!(NumberTopBottom::new(2, 2, 1).is_err());
        assert!(NumberTopBottom::new(0, 0, 0).is_ok());
    }

    #[test]
    fn componentwise_order() {
        let a = NumberTopBottom::new(2, 1, 0).unwrap();
        let b = NumberTopBottom::new(3, 1, 1).unwrap();
        assert!(a <= b);
        assert!(!(b <= a));
        assert!(a <= a);

        // Mixed components are unordered in both directions.
        let c = NumberTopBottom::new(4, 0, 0).unwrap();
        let d = NumberTopBottom::new(3, 1, 1).unwrap();
        assert!(!(c <= d));
        assert!(!(d <= c));
        assert_eq!(c.partial_cmp(&d), None);
    }

    #[test]
    fn exceeds_any_is_not_negated_leq() {
        let c = NumberTopBottom::new(4, 0, 0).unwrap();
        let d = NumberTopBottom::new(3, 1, 1).unwrap();
        // c exceeds d on total, d exceeds c on top and bottom.
        assert!(c.exceeds_any(&d));
        assert!(d.exceeds_any(&c));
        assert!(!c.exceeds_any(&c));
    }

    #[test]
    fn addition_is_componentwise() {
        let mut a = NumberTopBottom::new(2, 1, 0).unwrap();
        a += NumberTopBottom::single(1);
        assert_eq!(a, NumberTopBottom { total: 3, top: 1, bottom: 1 });
        assert_eq!(NumberTopBottom::single(0), NumberTopBottom { total: 1, top: 1, bottom: 0 });
    }

    #[test]
    fn serde_round_trip() {
        let n = NumberTopBottom::new(5, 2, 1).unwrap();
        let encoded = serde_json::to_string(&n).unwrap();
        assert_eq!(serde_json::from_str::<NumberTopBottom>(&encoded).unwrap(), n);
    }

    mod laws {
        use super::*;
        use proptest::prelude::*;

        fn arbitrary_number() -> impl Strategy<Value = NumberTopBottom> {
            (0usize..32, 0usize..32, 0usize..32).prop_map(|(total, top, bottom)| {
                NumberTopBottom { total: total + top + bottom, top, bottom }
            })
        }

        proptest! {
            /// Adding never shrinks any component.
            #[test]
            fn addition_is_monotone(a in arbitrary_number(), b in arbitrary_number()) {
                let sum = a + b;
                prop_assert!(a <= sum);
                prop_assert!(b <= sum);
            }

            /// The componentwise maximum covers both operands.
            #[test]
            fn max_covers_both(a in arbitrary_number(), b in arbitrary_number()) {
                let max = a.max(&b);
                prop_assert!(!a.exceeds_any(&max));
                prop_assert!(!b.exceeds_any(&max));
                prop_assert!(max.total <= a.total + b.total);
            }
        }
    }
}
