use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

/// amount in the account currency, kept as an exact decimal
///
/// arithmetic never rounds; callers round to cents with [`Money::round_cents`]
/// at the points where an amount becomes a booked figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// decimal places of the minor unit (kopecks)
    pub const MINOR_UNITS: u32 = 2;

    pub fn from_decimal(d: Decimal) -> Self {
        Money(d)
    }

    /// whole currency units
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// minor units, 12_345 -> 123.45
    pub fn from_minor(amount: i64) -> Self {
        Money(Decimal::new(amount, Self::MINOR_UNITS))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// half away from zero, so 0.125 books as 0.13
    pub fn round_cents(&self) -> Self {
        Money(
            self.0
                .round_dp_with_strategy(Self::MINOR_UNITS, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str_exact(s.trim()).map(Money)
    }
}

macro_rules! money_ops {
    ($($trait:ident::$method:ident, $assign:ident::$assign_method:ident => $op:tt;)*) => {
        $(
            impl $trait for Money {
                type Output = Money;

                fn $method(self, rhs: Money) -> Money {
                    Money(self.0 $op rhs.0)
                }
            }

            impl $assign for Money {
                fn $assign_method(&mut self, rhs: Money) {
                    *self = *self $op rhs;
                }
            }
        )*
    };
}

money_ops! {
    Add::add, AddAssign::add_assign => +;
    Sub::sub, SubAssign::sub_assign => -;
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

/// scaling by a plain factor, e.g. a rate or an installment count
impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, factor: Decimal) -> Money {
        Money(self.0 * factor)
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, divisor: Decimal) -> Money {
        Money(self.0 / divisor)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

/// annual rate as a fraction, 0.12 for 12%
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    pub fn from_decimal(fraction: Decimal) -> Self {
        Rate(fraction)
    }

    pub fn from_percentage(percent: u32) -> Self {
        Self::from_percent_decimal(Decimal::from(percent))
    }

    /// 12.5 -> 0.125
    pub fn from_percent_decimal(percent: Decimal) -> Self {
        Rate(percent / Decimal::ONE_HUNDRED)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn as_percentage(&self) -> Decimal {
        self.0 * Decimal::ONE_HUNDRED
    }

    /// nominal annual rate spread over twelve months
    pub fn monthly_rate(&self) -> Decimal {
        self.0 / Decimal::from(12)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().normalize())
    }
}
