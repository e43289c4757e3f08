//! Q16.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point scalar for agent physics.
//! Gameplay integration uses integer arithmetic only, so a run with the
//! same seed and inputs is bit-identical on every platform.
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
//!
//! The play field is a few hundred units tall and velocities are clamped
//! to the terminal velocity, so the 32k range is never approached.

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
// DEFAULT AGENT PHYSICS (All as integer literals - NO float conversion!)
// =============================================================================

/// Gravity per tick: 0.25 = 65536 / 4 = 16384
pub const DEFAULT_GRAVITY: Fixed = 16384;

/// Jump impulse: -6.0 = -6 * 65536 = -393216 (negative is upward)
pub const DEFAULT_JUMP_IMPULSE: Fixed = -393216;

/// Terminal (maximum downward) velocity: 96.0 = 96 * 65536 = 6291456
pub const DEFAULT_TERMINAL_VELOCITY: Fixed = 6291456;

// =============================================================================
// CORE OPERATIONS
// =============================================================================

/// Convert a float to fixed-point.
///
/// # Warning
/// Only use at compile-time or initialization. NEVER in tick loop.
///
/// # Example
/// ```
/// use flappy_swarm::core::fixed::{to_fixed, FIXED_ONE};
/// const MY_VALUE: i32 = to_fixed(2.5);
/// assert_eq!(MY_VALUE, FIXED_ONE * 2 + FIXED_ONE / 2);
/// ```
#[inline]
pub const fn to_fixed(f: f64) -> Fixed {
    (f * (FIXED_ONE as f64)) as Fixed
}

/// Convert fixed-point to float for sensor output.
///
/// # Warning
/// Only use for observation. NEVER feed the result back into game logic.
#[inline]
pub fn to_f64(f: Fixed) -> f64 {
    f as f64 / FIXED_ONE as f64
}

/// Convert an integer world coordinate to fixed-point.
#[inline]
pub const fn from_int(i: i32) -> Fixed {
    i << FIXED_SCALE
}

/// Floor a fixed-point value to whole world units.
///
/// Arithmetic shift rounds toward negative infinity.
#[inline]
pub const fn floor_to_int(f: Fixed) -> i32 {
    f >> FIXED_SCALE
}

/// Minimum of two fixed-point numbers.
#[inline]
pub fn fixed_min(a: Fixed, b: Fixed) -> Fixed {
    if a < b { a } else { b }
}

// =============================================================================
// TESTS
// =============================================================================
