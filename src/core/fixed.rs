//! Q16.16 Fixed-Point Arithmetic
//!
//! Every quantity stored in the world (positions, velocities, radii, economy
//! stocks) is fixed-point so that applying the same instructions and commands
//! yields bit-identical worlds on every peer, whatever the CPU.
//!
//! ## Format: Q16.16
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bit Layout: Q16.16 (32-bit signed integer)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [S][IIIIIIIIIIIIIIII][FFFFFFFFFFFFFFFF]                    │
//! │   │  └──── 16 bits ────┘└──── 16 bits ────┘                 │
//! │   └─ Sign bit                                               │
//! │                                                             │
//! │  Range: -32768.0 to +32767.99998 (approx)                   │
//! │  Precision: 1/65536 ≈ 0.000015 units                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

/// Q16.16 fixed-point number stored as i32.
/// 16 bits integer, 16 bits fractional.
pub type Fixed = i32;

/// Number of fractional bits (16)
pub const FIXED_SCALE: i32 = 16;

/// 1.0 in fixed-point (65536)
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE; // 65536

/// 0.5 in fixed-point (32768)
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1; // 32768

// =============================================================================
// GAME CONSTANTS (All as integer literals - NO float conversion!)
// =============================================================================

/// Projectiles consumed by one shot: 1.0 = 65536
pub const PROJECTILE_COST: Fixed = FIXED_ONE;

/// Launch speed relative to the firing body: 0.9 = floor(0.9 * 65536) = 58982
pub const PROJECTILE_SPEED: Fixed = 58982;

/// Spawn distance from body center, in body radii: 1.5 = 98304
pub const PROJECTILE_SPAWN_FACTOR: Fixed = 98304;

/// Arena half-extent used by the generator: 64.0 = 64 * 65536 = 4194304
pub const ARENA_HALF_EXTENT: Fixed = 4194304;

// =============================================================================
// CORE OPERATIONS (All deterministic, wrapping semantics)
// =============================================================================

/// Convert a compile-time float to fixed-point.
///
/// # Warning
/// Only use at compile-time, in tests, or for collaborator input. NEVER
/// inside instruction or command application.
///
/// # Example
/// ```
/// use syzygy::core::fixed::{to_fixed, FIXED_ONE};
/// const MY_VALUE: i32 = to_fixed(2.5);
/// assert_eq!(MY_VALUE, FIXED_ONE * 2 + FIXED_ONE / 2);
/// ```
#[inline]
pub const fn to_fixed(f: f64) -> Fixed {
    (f * (FIXED_ONE as f64)) as Fixed
}

/// Multiply two fixed-point numbers.
///
/// Uses an i64 intermediate to prevent overflow, then truncates.
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    let wide = (a as i64) * (b as i64);
    (wide >> FIXED_SCALE) as Fixed
}

/// Divide two fixed-point numbers.
///
/// Pre-shifts the numerator to keep precision.
/// Divide-by-zero returns 0 rather than panicking.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if b == 0 {
        return 0;
    }
    let wide = (a as i64) << FIXED_SCALE;
    (wide / b as i64) as Fixed
}

/// Integer square root (floor) of a u64, by Newton iteration on integers.
#[inline]
pub fn isqrt_u64(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = (x >> 1) + (x & 1);
    while y < x {
        x = y;
        y = (x + n / x) >> 1;
    }
    x
}

/// Clamp a fixed-point number to a range.
#[inline]
pub fn fixed_clamp(value: Fixed, min: Fixed, max: Fixed) -> Fixed {
    value.min(max).max(min)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_constants() {
        assert_eq!(FIXED_ONE, 65536);
        assert_eq!(FIXED_HALF, 32768);
        assert_eq!(FIXED_SCALE, 16);
    }

    #[test]
    fn test_to_fixed() {
        assert_eq!(to_fixed(1.0), FIXED_ONE);
        assert_eq!(to_fixed(0.5), FIXED_HALF);
        assert_eq!(to_fixed(-1.0), -FIXED_ONE);
    }

    #[test]
    fn test_fixed_mul() {
        assert_eq!(fixed_mul(to_fixed(2.0), to_fixed(3.0)), to_fixed(6.0));
        assert_eq!(fixed_mul(FIXED_HALF, FIXED_HALF), to_fixed(0.25));
        assert_eq!(fixed_mul(to_fixed(-2.0), to_fixed(3.0)), to_fixed(-6.0));
    }

    #[test]
    fn test_fixed_div() {
        assert_eq!(fixed_div(to_fixed(6.0), to_fixed(2.0)), to_fixed(3.0));
        assert_eq!(fixed_div(FIXED_ONE, to_fixed(4.0)), to_fixed(0.25));
        assert_eq!(fixed_div(FIXED_ONE, 0), 0);
    }

    #[test]
    fn test_isqrt_floor() {
        assert_eq!(isqrt_u64(0), 0);
        assert_eq!(isqrt_u64(2), 1);
        assert_eq!(isqrt_u64(3), 1);
        assert_eq!(isqrt_u64(4), 2);
        assert_eq!(isqrt_u64(99), 9);
        assert_eq!(isqrt_u64(u64::MAX), 4294967295);
    }

    #[test]
    fn test_game_constants() {
        assert_eq!(PROJECTILE_COST, FIXED_ONE);
        assert_eq!(PROJECTILE_SPAWN_FACTOR, to_fixed(1.5));
        assert_eq!(PROJECTILE_SPEED, to_fixed(0.9));
        assert_eq!(ARENA_HALF_EXTENT, 64 * FIXED_ONE);
    }

    #[test]
    fn test_fixed_clamp() {
        assert_eq!(fixed_clamp(to_fixed(5.0), 0, FIXED_ONE), FIXED_ONE);
        assert_eq!(fixed_clamp(to_fixed(-5.0), 0, FIXED_ONE), 0);
        assert_eq!(fixed_clamp(FIXED_HALF, 0, FIXED_ONE), FIXED_HALF);
    }
}
