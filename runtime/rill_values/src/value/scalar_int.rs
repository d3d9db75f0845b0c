//! Integer newtype that prevents unchecked arithmetic.
//!
//! `ScalarInt` wraps `i64` and intentionally does NOT implement `Add`,
//! `Sub`, `Mul`, `Div`, `Rem` or `Neg`. All arithmetic goes through checked
//! methods returning `Result<ScalarInt, ArithmeticError>` whose error kind
//! distinguishes overflow from underflow from division by zero, because
//! user code observes the three as distinct error identifiers.

use std::fmt;

/// Checked-arithmetic failure, direction-aware.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArithmeticError {
    /// Result exceeds `i64::MAX`.
    IntOverflow,
    /// Result is below `i64::MIN`.
    IntUnderflow,
    /// Division or remainder by zero.
    IntDivisionByZero,
    /// Negation of `i64::MIN`.
    NegationWithOverflow,
}

impl ArithmeticError {
    /// Stable identifier surfaced to user code.
    pub const fn id(self) -> &'static str {
        match self {
            ArithmeticError::IntOverflow => "IntOverflow",
            ArithmeticError::IntUnderflow => "IntUnderflow",
            ArithmeticError::IntDivisionByZero => "IntDivisionByZero",
            ArithmeticError::NegationWithOverflow => "NegationWithOverflow",
        }
    }
}

impl fmt::Display for ArithmeticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithmeticError::IntOverflow => write!(f, "integer overflow"),
            ArithmeticError::IntUnderflow => write!(f, "integer underflow"),
            ArithmeticError::IntDivisionByZero => write!(f, "integer division by zero"),
            ArithmeticError::NegationWithOverflow => write!(f, "negation with overflow"),
        }
    }
}

impl std::error::Error for ArithmeticError {}

/// A 64-bit signed integer whose arithmetic is always checked.
///
/// Using `+`, `-`, `*`, `/` directly on `ScalarInt` is a compile error.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct ScalarInt(i64);

impl ScalarInt {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1);
    pub const MIN: Self = Self(i64::MIN);
    pub const MAX: Self = Self(i64::MAX);

    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Overflow direction for a two-operand op: adding values of the same
    /// negative sign (or subtracting past `MIN`) underflows, everything
    /// else overflows.
    const fn directed(result: Option<i64>, negative: bool) -> Result<Self, ArithmeticError> {
        match result {
            Some(v) => Ok(Self(v)),
            None if negative => Err(ArithmeticError::IntUnderflow),
            None => Err(ArithmeticError::IntOverflow),
        }
    }

    /// Checked addition.
    #[inline]
    pub const fn checked_add(self, rhs: Self) -> Result<Self, ArithmeticError> {
        Self::directed(self.0.checked_add(rhs.0), self.0 < 0 && rhs.0 < 0)
    }

    /// Checked subtraction.
    #[inline]
    pub const fn checked_sub(self, rhs: Self) -> Result<Self, ArithmeticError> {
        Self::directed(self.0.checked_sub(rhs.0), self.0 < 0 && rhs.0 > 0)
    }

    /// Checked multiplication.
    #[inline]
    pub const fn checked_mul(self, rhs: Self) -> Result<Self, ArithmeticError> {
        Self::directed(self.0.checked_mul(rhs.0), (self.0 < 0) != (rhs.0 < 0))
    }

    /// Checked division, truncating toward zero.
    #[inline]
    pub const fn checked_div(self, rhs: Self) -> Result<Self, ArithmeticError> {
        if rhs.0 == 0 {
            return Err(ArithmeticError::IntDivisionByZero);
        }
        // Only i64::MIN / -1 can overflow here.
        match self.0.checked_div(rhs.0) {
            Some(v) => Ok(Self(v)),
            None => Err(ArithmeticError::IntOverflow),
        }
    }

    /// Checked remainder.
    #[inline]
    pub const fn checked_rem(self, rhs: Self) -> Result<Self, ArithmeticError> {
        if rhs.0 == 0 {
            return Err(ArithmeticError::IntDivisionByZero);
        }
        match self.0.checked_rem(rhs.0) {
            Some(v) => Ok(Self(v)),
            None => Err(ArithmeticError::IntOverflow),
        }
    }

    /// Checked negation. `i64::MIN` has no positive counterpart.
    #[inline]
    pub const fn checked_neg(self) -> Result<Self, ArithmeticError> {
        match self.0.checked_neg() {
            Some(v) => Ok(Self(v)),
            None => Err(ArithmeticError::NegationWithOverflow),
        }
    }
}

impl fmt::Debug for ScalarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ScalarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ScalarInt {
    #[inline]
    fn from(value: i64) -> Self {
        Self(value)
    }
}
