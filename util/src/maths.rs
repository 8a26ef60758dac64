//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Tolerance used when comparing floating point values against zero, the
/// single precision machine epsilon.
pub const FLT_EPSILON: f32 = f32::EPSILON;

/// Standard gravity
///
/// Units: meters/second^2
pub const GRAVITY_MSS: f64 = 9.80665;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------
//
// Functions are generic over `f32` and `f64`. Literals are converted through
// `From<f32>`, which is lossless for both.

/// Constrain a value between `min` and `max`.
///
/// A NaN input is mapped to the midpoint of the range so that it cannot
/// propagate into a controller.
pub fn constrain<T>(value: T, min: T, max: T) -> T
where
    T: Float
{
    if value.is_nan() {
        return (min + max) / (T::one() + T::one());
    }

    if value > max {
        max
    }
    else if value < min {
        min
    }
    else {
        value
    }
}

/// Square root which returns zero instead of NaN for negative inputs.
pub fn safe_sqrt<T>(value: T) -> T
where
    T: Float
{
    let ret = value.sqrt();

    if ret.is_nan() {
        T::zero()
    }
    else {
        ret
    }
}

/// Returns true if the value is within `FLT_EPSILON` of zero.
pub fn is_zero<T>(value: T) -> bool
where
    T: Float + From<f32>
{
    value.abs() < lit(FLT_EPSILON)
}

/// Returns true if the value is greater than `FLT_EPSILON`.
pub fn is_positive<T>(value: T) -> bool
where
    T: Float + From<f32>
{
    value >= lit(FLT_EPSILON)
}

/// Returns true if the two values are within `FLT_EPSILON` of each other.
pub fn is_equal<T>(a: T, b: T) -> bool
where
    T: Float + From<f32>
{
    is_zero(a - b)
}

/// Convert an angle in radians into centi-degrees.
pub fn rad_to_cd<T>(value: T) -> T
where
    T: Float + From<f32>
{
    value.to_degrees() * lit(100.0)
}

/// Wrap an angle in centi-degrees into the range [0, 36000).
pub fn wrap_360_cd<T>(value: T) -> T
where
    T: Float + From<f32>
{
    let full_turn = lit(36000.0);
    let res = rem_euclid(value, full_turn);

    // Round-off can leave the remainder at exactly the modulus
    if res >= full_turn {
        T::zero()
    }
    else {
        res
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a literal into the working float type.
fn lit<T: From<f32>>(value: f32) -> T {
    T::from(value)
}
