use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits. All simulated
/// time, progress, and rate arithmetic in the tick loop uses this type.
pub type Fixed64 = I32F32;

/// Simulated seconds.
pub type SimTime = Fixed64;

/// Convert an f64 to Fixed64. Use only at the API boundary (caller `dt`,
/// parameters, geometry), never inside the tick loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    if v.is_nan() {
        return Fixed64::ZERO;
    }
    Fixed64::saturating_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display and rendering.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Checked division that returns None on a zero divisor.
#[inline]
pub fn checked_div_64(a: Fixed64, b: Fixed64) -> Option<Fixed64> {
    a.checked_div(b)
}

/// Clamp a ratio into `[0, 1]`.
#[inline]
pub fn clamp_unit(v: Fixed64) -> Fixed64 {
    v.clamp(Fixed64::ZERO, Fixed64::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_exact_values() {
        assert_eq!(fixed64_to_f64(f64_to_fixed64(1.5)), 1.5);
        assert_eq!(fixed64_to_f64(f64_to_fixed64(-0.25)), -0.25);
    }

    #[test]
    fn nan_becomes_zero() {
        assert_eq!(f64_to_fixed64(f64::NAN), Fixed64::ZERO);
    }

    #[test]
    fn huge_values_saturate() {
        assert_eq!(f64_to_fixed64(1e30), Fixed64::MAX);
        assert_eq!(f64_to_fixed64(f64::NEG_INFINITY), Fixed64::MIN);
    }

    #[test]
    fn checked_div_by_zero() {
        assert!(checked_div_64(Fixed64::ONE, Fixed64::ZERO).is_none());
        assert_eq!(
            checked_div_64(Fixed64::from_num(3), Fixed64::from_num(2)),
            Some(Fixed64::from_num(1.5))
        );
    }

    #[test]
    fn clamp_unit_bounds() {
        assert_eq!(clamp_unit(Fixed64::from_num(2)), Fixed64::ONE);
        assert_eq!(clamp_unit(Fixed64::from_num(-1)), Fixed64::ZERO);
        assert_eq!(clamp_unit(Fixed64::from_num(0.5)), Fixed64::from_num(0.5));
    }

    #[test]
    fn determinism() {
        let a = f64_to_fixed64(0.1);
        let b = f64_to_fixed64(0.1);
        assert_eq!(a * Fixed64::from_num(7), b * Fixed64::from_num(7));
    }
}
