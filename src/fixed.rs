//! Deterministic Fixed-Point Scalar
//!
//! > Same bits in, same bits out, on every machine.
//!
//! # Overview
//!
//! `Fix64` is a Q31.32 number: a signed 64-bit integer `raw` interpreted as
//! `raw / 2^32`. Every operation is pure integer arithmetic, so results are
//! bit-identical on x86, ARM, WASM or anything else with a two's-complement
//! integer unit. No IEEE 754 value ever enters simulation state.
//!
//! # Features
//!
//! - **Saturating**: `+`, `-`, `*` and negation clamp to [`Fix64::MIN`, `Fix64::MAX`]
//! - **Division policy**: `/` by zero returns a signed sentinel (`MAX`, `MIN`,
//!   or `ZERO` for `0/0`); [`Fix64::checked_div`] reports [`PhysicsError::DivideByZero`]
//! - **Transcendentals**: sqrt, sin/cos/tan, atan/atan2, exp, ln from integer
//!   polynomials, no float intrinsics
//! - **Decimal text**: parse and display round half-to-even
//!
//! # Precision
//!
//! - Range: ±2,147,483,648
//! - Resolution: 2^-32 ≈ 2.3 × 10^-10
//! - `sqrt`: floor of the exact root, error < 1 ulp
//! - `sin`, `cos`, `atan`, `atan2`, `ln`: absolute error ≤ 2^-28
//! - `exp`: relative error ≤ 2^-26

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, Sub, SubAssign};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

// ============================================================================
// Fix64 (Q31.32)
// ============================================================================

/// 64-bit fixed-point number with 32 fractional bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Fix64(i64);

const FRAC_MASK: i64 = 0xFFFF_FFFF;

/// ln(2) scaled by 2^62, used for exact range reduction in `exp`/`ln`.
const LN2_Q62: i128 = 3_196_577_161_300_663_915;

impl Fix64 {
    /// Number of fractional bits.
    pub const FRAC_BITS: u32 = 32;

    /// 0
    pub const ZERO: Self = Self(0);
    /// 1
    pub const ONE: Self = Self(1 << 32);
    /// -1
    pub const NEG_ONE: Self = Self(-(1 << 32));
    /// 0.5
    pub const HALF: Self = Self(1 << 31);
    /// 2
    pub const TWO: Self = Self(2 << 32);
    /// Largest representable value (2^31 - 2^-32).
    pub const MAX: Self = Self(i64::MAX);
    /// Smallest representable value (-2^31).
    pub const MIN: Self = Self(i64::MIN);
    /// Smallest positive value (2^-32).
    pub const EPSILON: Self = Self(1);

    /// π
    pub const PI: Self = Self(13_493_037_705);
    /// π/2
    pub const HALF_PI: Self = Self(6_746_518_852);
    /// π/4
    pub const QUARTER_PI: Self = Self(3_373_259_426);
    /// 2π
    pub const TWO_PI: Self = Self(26_986_075_409);
    /// ln(2)
    pub const LN2: Self = Self(2_977_044_472);

    const SQRT3: Self = Self(7_439_101_574);
    const SIXTH_PI: Self = Self(2_248_839_617);
    /// tan(π/12) = 2 - √3
    const TAN_TWELFTH_PI: Self = Self(1_150_833_018);
    /// ln(2^31): `exp` of anything at or above this saturates.
    const EXP_MAX_ARG: Self = Self(92_288_378_626);
    /// `exp` of anything below -22.5 rounds to zero.
    const EXP_MIN_ARG: Self = Self(-(22 << 32) - (1 << 31));

    /// Create from raw Q31.32 bits.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw Q31.32 bits.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Create from an integer, saturating outside ±2^31.
    #[inline]
    pub const fn from_int(n: i64) -> Self {
        if n > i32::MAX as i64 {
            Self::MAX
        } else if n < i32::MIN as i64 {
            Self::MIN
        } else {
            Self(n << 32)
        }
    }

    /// Create `num / den`, truncated toward zero.
    ///
    /// A zero denominator yields the same sentinel as `/`.
    #[inline]
    pub const fn from_ratio(num: i64, den: i64) -> Self {
        if den == 0 {
            return Self::div_zero_sentinel(num);
        }
        Self::saturate(((num as i128) << 32) / den as i128)
    }

    /// Integer part, rounded toward negative infinity.
    #[inline]
    pub const fn to_int(self) -> i64 {
        self.0 >> 32
    }

    /// Lossy conversion for diagnostics and logging only.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 4_294_967_296.0
    }

    #[inline]
    const fn saturate(v: i128) -> Self {
        if v > i64::MAX as i128 {
            Self::MAX
        } else if v < i64::MIN as i128 {
            Self::MIN
        } else {
            Self(v as i64)
        }
    }

    #[inline]
    const fn div_zero_sentinel(num: i64) -> Self {
        if num > 0 {
            Self::MAX
        } else if num < 0 {
            Self::MIN
        } else {
            Self::ZERO
        }
    }

    // ------------------------------------------------------------------------
    // Predicates and rounding
    // ------------------------------------------------------------------------

    /// `true` if exactly zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `true` if strictly below zero.
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// `true` if strictly above zero.
    #[inline]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Absolute value; `MIN.abs()` saturates to `MAX`.
    #[inline]
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// -1, 0 or 1.
    #[inline]
    pub const fn signum(self) -> Self {
        match self.0 {
            0 => Self::ZERO,
            r if r > 0 => Self::ONE,
            _ => Self::NEG_ONE,
        }
    }

    /// Largest integer value not above `self`.
    #[inline]
    pub const fn floor(self) -> Self {
        Self(self.0 & !FRAC_MASK)
    }

    /// Smallest integer value not below `self` (saturating).
    #[inline]
    pub const fn ceil(self) -> Self {
        if self.0 & FRAC_MASK == 0 {
            self
        } else {
            Self((self.0 & !FRAC_MASK).saturating_add(1 << 32))
        }
    }

    /// Nearest integer value, ties to even (saturating).
    pub const fn round(self) -> Self {
        let frac = self.0 & FRAC_MASK;
        let floor = self.0 & !FRAC_MASK;
        let half = 1i64 << 31;
        let odd = (floor >> 32) & 1 == 1;
        if frac > half || (frac == half && odd) {
            Self(floor.saturating_add(1 << 32))
        } else {
            Self(floor)
        }
    }

    /// Fractional part, always in [0, 1).
    #[inline]
    pub const fn fract(self) -> Self {
        Self(self.0 & FRAC_MASK)
    }

    /// `self / 2` (rounds toward negative infinity).
    #[inline]
    pub const fn half(self) -> Self {
        Self(self.0 >> 1)
    }

    /// `self * 2` (saturating).
    #[inline]
    pub const fn double(self) -> Self {
        Self(self.0.saturating_add(self.0))
    }

    /// Multiply by an integer (saturating).
    #[inline]
    pub const fn mul_int(self, n: i64) -> Self {
        Self::saturate(self.0 as i128 * n as i128)
    }

    /// Divide by an integer, truncating toward zero. Division by zero yields the sign sentinel.
    #[inline]
    pub const fn div_int(self, n: i64) -> Self {
        if n == 0 {
            return Self::div_zero_sentinel(self.0);
        }
        Self::saturate(self.0 as i128 / n as i128)
    }

    /// Division that reports a zero divisor instead of saturating.
    pub fn checked_div(self, rhs: Self) -> Result<Self> {
        if rhs.0 == 0 {
            Err(PhysicsError::DivideByZero)
        } else {
            Ok(self / rhs)
        }
    }

    /// Multiply by `2^shift` (negative shifts divide, rounding toward negative infinity).
    #[inline]
    pub(crate) const fn shifted(self, shift: i32) -> Self {
        if shift >= 0 {
            let bits = if shift > 64 { 64 } else { shift as u32 };
            Self::saturate((self.0 as i128) << bits)
        } else {
            let bits = if shift < -63 { 63 } else { (-shift) as u32 };
            Self(self.0 >> bits)
        }
    }

    // ------------------------------------------------------------------------
    // Square root
    // ------------------------------------------------------------------------

    /// Square root; negative input is a domain error.
    pub fn sqrt(self) -> Result<Self> {
        if self.0 < 0 {
            return Err(PhysicsError::Domain {
                operation: "sqrt",
                input: self.to_string(),
            });
        }
        Ok(self.sqrt_sat())
    }

    /// Square root with negative input clamped to zero.
    ///
    /// Used on quantities that are non-negative by construction (squared lengths).
    pub fn sqrt_sat(self) -> Self {
        if self.0 <= 0 {
            return Self::ZERO;
        }
        Self(isqrt_u128((self.0 as u128) << 32) as i64)
    }

    // ------------------------------------------------------------------------
    // Trigonometry
    // ------------------------------------------------------------------------

    /// Sine (radians).
    pub fn sin(self) -> Self {
        sin_reduced(self.0 % Self::TWO_PI.0)
    }

    /// Cosine (radians).
    pub fn cos(self) -> Self {
        sin_reduced(self.0 % Self::TWO_PI.0 + Self::HALF_PI.0)
    }

    /// `(sin, cos)` pair.
    #[inline]
    pub fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    /// Tangent; saturates near the poles.
    pub fn tan(self) -> Self {
        let (s, c) = self.sin_cos();
        s / c
    }

    /// Arctangent, result in [-π/2, π/2].
    pub fn atan(self) -> Self {
        if self.0 < 0 {
            return -(-self).atan();
        }
        if self > Self::ONE {
            return Self::HALF_PI - atan_unit(Self::ONE / self);
        }
        atan_unit(self)
    }

    /// Four-quadrant arctangent of `y / x`, result in [-π, π]. `atan2(0, 0) == 0`.
    pub fn atan2(y: Self, x: Self) -> Self {
        if x.0 == 0 {
            return match y.0 {
                0 => Self::ZERO,
                r if r > 0 => Self::HALF_PI,
                _ => -Self::HALF_PI,
            };
        }
        let ax = x.abs();
        let ay = y.abs();
        let first_quadrant = if ay <= ax {
            atan_unit(ay / ax)
        } else {
            Self::HALF_PI - atan_unit(ax / ay)
        };
        let angle = if x.0 < 0 {
            Self::PI - first_quadrant
        } else {
            first_quadrant
        };
        if y.0 < 0 {
            -angle
        } else {
            angle
        }
    }

    // ------------------------------------------------------------------------
    // Exponential and logarithm
    // ------------------------------------------------------------------------

    /// `e^self`, saturating to `MAX` above ln(2^31) and flushing to zero below -22.5.
    pub fn exp(self) -> Self {
        if self.0 == 0 {
            return Self::ONE;
        }
        if self >= Self::EXP_MAX_ARG {
            return Self::MAX;
        }
        if self < Self::EXP_MIN_ARG {
            return Self::ZERO;
        }

        // self = k·ln2 + r, |r| <= ln2/2
        let k = (self / Self::LN2).round().to_int();
        let r = self - k_ln2(k);

        // e^r = 1 + r(1 + r/2(1 + r/3(... (1 + r/10))))
        let mut acc = Self::ONE;
        for n in (1..=10).rev() {
            acc = Self::ONE + (r * acc).div_int(n);
        }
        acc.shifted(k as i32)
    }

    /// Natural logarithm; input ≤ 0 is a domain error.
    pub fn ln(self) -> Result<Self> {
        if self.0 <= 0 {
            return Err(PhysicsError::Domain {
                operation: "ln",
                input: self.to_string(),
            });
        }

        // self = m · 2^k with m in [1, 2)
        let msb = 63 - self.0.leading_zeros() as i32;
        let k = msb - 32;
        let m = if k >= 0 {
            Self(self.0 >> k)
        } else {
            Self(self.0 << -k)
        };

        // ln(m) = 2·atanh(s), s = (m-1)/(m+1) in [0, 1/3)
        let s = (m - Self::ONE) / (m + Self::ONE);
        let s2 = s * s;
        let mut power = s;
        let mut acc = Self::ZERO;
        for n in 0..11 {
            acc += power.div_int(2 * n + 1);
            power = power * s2;
        }
        Ok(acc.double() + k_ln2(k as i64))
    }
}

/// `k · ln2` with the product taken at 62 fractional bits.
#[inline]
fn k_ln2(k: i64) -> Fix64 {
    let wide = k as i128 * LN2_Q62;
    Fix64::saturate((wide + (1 << 29)) >> 30)
}

/// Floor integer square root by the bit-by-bit method.
fn isqrt_u128(n: u128) -> u128 {
    if n == 0 {
        return 0;
    }
    let mut rem = n;
    let mut root = 0u128;
    let mut bit = 1u128 << ((127 - n.leading_zeros()) & !1);
    while bit != 0 {
        if rem >= root + bit {
            rem -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }
    root
}

/// Sine of a raw angle in (-2.5π, 2.5π).
fn sin_reduced(raw: i64) -> Fix64 {
    let pi = Fix64::PI.0;
    let half_pi = Fix64::HALF_PI.0;
    let mut x = raw % Fix64::TWO_PI.0;
    if x > pi {
        x -= Fix64::TWO_PI.0;
    } else if x < -pi {
        x += Fix64::TWO_PI.0;
    }
    // Fold into [-π/2, π/2] using sin(π - x) = sin(x)
    if x > half_pi {
        x = pi - x;
    } else if x < -half_pi {
        x = -pi - x;
    }
    let x = Fix64(x);
    let x2 = x * x;
    // x(1 - x²/(2·3)(1 - x²/(4·5)(1 - ... (1 - x²/(14·15)))))
    let mut acc = Fix64::ONE;
    for k in [210, 156, 110, 72, 42, 20, 6] {
        acc = Fix64::ONE - (x2 * acc).div_int(k);
    }
    x * acc
}

/// Arctangent on [0, 1].
fn atan_unit(x: Fix64) -> Fix64 {
    if x > Fix64::TAN_TWELFTH_PI {
        // atan(x) = π/6 + atan((x√3 - 1) / (√3 + x))
        let y = (x * Fix64::SQRT3 - Fix64::ONE) / (Fix64::SQRT3 + x);
        return Fix64::SIXTH_PI + atan_series(y);
    }
    atan_series(x)
}

/// Alternating series for |x| <= tan(π/12).
fn atan_series(x: Fix64) -> Fix64 {
    let x2 = x * x;
    let mut power = x;
    let mut acc = Fix64::ZERO;
    for k in 0..9 {
        let term = power.div_int(2 * k + 1);
        if k % 2 == 0 {
            acc += term;
        } else {
            acc -= term;
        }
        power = power * x2;
    }
    acc
}

// ============================================================================
// Operators
// ============================================================================

impl Add for Fix64 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Fix64 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Mul for Fix64 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::saturate((self.0 as i128 * rhs.0 as i128) >> 32)
    }
}

impl Div for Fix64 {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return Self::div_zero_sentinel(self.0);
        }
        Self::saturate(((self.0 as i128) << 32) / rhs.0 as i128)
    }
}

impl Rem for Fix64 {
    type Output = Self;

    #[inline]
    fn rem(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return Self::ZERO;
        }
        Self(self.0.wrapping_rem(rhs.0))
    }
}

impl Neg for Fix64 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl AddAssign for Fix64 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Fix64 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Fix64 {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for Fix64 {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl Sum for Fix64 {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |a, b| a + b)
    }
}

impl From<i32> for Fix64 {
    #[inline]
    fn from(n: i32) -> Self {
        Self((n as i64) << 32)
    }
}

// ============================================================================
// Decimal text
// ============================================================================

/// Fraction digits considered exactly when parsing; later digits only break ties.
const MAX_PARSE_DIGITS: usize = 38;
/// Upper bound on printed fraction digits.
const MAX_DISPLAY_DIGITS: usize = 20;

impl FromStr for Fix64 {
    type Err = PhysicsError;

    fn from_str(s: &str) -> Result<Self> {
        let err = |reason| PhysicsError::Parse {
            input: s.to_string(),
            reason,
        };

        let text = s.trim();
        let (negative, body) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err("no digits"));
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err("unexpected character"));
        }

        let mut int_val: u128 = 0;
        for b in int_part.bytes() {
            int_val = int_val * 10 + u128::from(b - b'0');
            if int_val > 1 << 31 {
                return Err(err("out of range"));
            }
        }

        let exact = &frac_part[..frac_part.len().min(MAX_PARSE_DIGITS)];
        let sticky = frac_part.bytes().skip(MAX_PARSE_DIGITS).any(|b| b != b'0');
        let mut num: u128 = 0;
        let mut den: u128 = 1;
        for b in exact.bytes() {
            num = num * 10 + u128::from(b - b'0');
            den *= 10;
        }
        // Binary long division: frac_raw = floor(num · 2^32 / den)
        let mut frac_raw: u128 = 0;
        let mut rem = num;
        for _ in 0..32 {
            rem <<= 1;
            frac_raw <<= 1;
            if rem >= den {
                rem -= den;
                frac_raw |= 1;
            }
        }
        let twice_rem = rem << 1;
        if twice_rem > den || (twice_rem == den && (sticky || frac_raw & 1 == 1)) {
            frac_raw += 1;
        }

        let magnitude = (int_val << 32) + frac_raw;
        let limit = if negative { 1u128 << 63 } else { (1u128 << 63) - 1 };
        if magnitude > limit {
            return Err(err("out of range"));
        }
        let raw = if negative {
            (-(magnitude as i128)) as i64
        } else {
            magnitude as i64
        };
        Ok(Self(raw))
    }
}

impl fmt::Display for Fix64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = f.precision().unwrap_or(10).min(MAX_DISPLAY_DIGITS);
        let trim = f.precision().is_none();

        let magnitude = self.0.unsigned_abs() as u128;
        let mut int_val = magnitude >> 32;
        let frac = magnitude & FRAC_MASK as u128;

        let scale = 10u128.pow(digits as u32);
        let product = frac * scale;
        let mut frac_digits = product >> 32;
        let rem = product & FRAC_MASK as u128;
        let half = 1u128 << 31;
        if rem > half || (rem == half && frac_digits & 1 == 1) {
            frac_digits += 1;
        }
        if frac_digits == scale {
            int_val += 1;
            frac_digits = 0;
        }

        let sign = if self.0 < 0 && (int_val != 0 || frac_digits != 0) {
            "-"
        } else {
            ""
        };
        let mut frac_text = if digits == 0 {
            String::new()
        } else {
            format!("{:0width$}", frac_digits, width = digits)
        };
        if trim {
            while frac_text.ends_with('0') {
                frac_text.pop();
            }
        }
        if frac_text.is_empty() {
            write!(f, "{sign}{int_val}")
        } else {
            write!(f, "{sign}{int_val}.{frac_text}")
        }
    }
}

impl fmt::Debug for Fix64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fix64({self})")
    }
}
