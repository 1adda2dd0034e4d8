// Fixed-Point Arithmetic
//
// 17.14 signed fixed-point numbers, used by the MLFQ estimator for
// `recent_cpu` and `load_avg`, where plain integers would throw away the
// fractional accumulation that makes the decay formulas converge correctly.
//
// Representation: a `Fixed` value stores `real * F` in its inner `i32`,
// with `F = 1 << 14`. Multiplication and division widen to `i64` before
// scaling, matching the reference formulas, so intermediate products never
// overflow `i32` for the priority/nice/recent_cpu ranges this kernel uses.

#![allow(dead_code)]

pub const FIXED_POINT_SHIFT: u32 = 14;
pub const F: i32 = 1 << FIXED_POINT_SHIFT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);

    pub const fn from_int(n: i32) -> Fixed {
        Fixed(n * F)
    }

    pub const fn from_raw(raw: i32) -> Fixed {
        Fixed(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Truncates toward zero.
    pub fn to_int_trunc(self) -> i32 {
        self.0 / F
    }

    /// Rounds to the nearest integer, ties away from zero.
    pub fn to_int_round(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + F / 2) / F
        } else {
            (self.0 - F / 2) / F
        }
    }

    /// `self * scale`, then rounded to the nearest integer. Used to report
    /// `recent_cpu`/`load_avg` scaled by 100 without losing the fraction.
    pub fn to_scaled_round(self, scale: i32) -> i32 {
        self.mul_int(scale).to_int_round()
    }

    pub fn add(self, other: Fixed) -> Fixed {
        Fixed(self.0 + other.0)
    }

    pub fn sub(self, other: Fixed) -> Fixed {
        Fixed(self.0 - other.0)
    }

    pub fn add_int(self, n: i32) -> Fixed {
        self.add(Fixed::from_int(n))
    }

    pub fn sub_int(self, n: i32) -> Fixed {
        self.sub(Fixed::from_int(n))
    }

    pub fn mul(self, other: Fixed) -> Fixed {
        Fixed(((self.0 as i64 * other.0 as i64) / F as i64) as i32)
    }

    pub fn mul_int(self, n: i32) -> Fixed {
        Fixed(self.0 * n)
    }

    pub fn div(self, other: Fixed) -> Fixed {
        debug_assert!(other.0 != 0, "fixed-point division by zero");
        Fixed(((self.0 as i64 * F as i64) / other.0 as i64) as i32)
    }

    pub fn div_int(self, n: i32) -> Fixed {
        Fixed(self.0 / n)
    }

    pub fn neg(self) -> Fixed {
        Fixed(-self.0)
    }
}

impl core::ops::Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed::add(self, rhs)
    }
}

impl core::ops::Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed::sub(self, rhs)
    }
}

impl core::ops::Mul for Fixed {
    type Output = Fixed;
    fn mul(self, rhs: Fixed) -> Fixed {
        Fixed::mul(self, rhs)
    }
}

impl core::ops::Div for Fixed {
    type Output = Fixed;
    fn div(self, rhs: Fixed) -> Fixed {
        Fixed::div(self, rhs)
    }
}

impl core::ops::Neg for Fixed {
    type Output = Fixed;
    fn neg(self) -> Fixed {
        Fixed::neg(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip() {
        assert_eq!(Fixed::from_int(5).to_int_trunc(), 5);
        assert_eq!(Fixed::from_int(-5).to_int_trunc(), -5);
    }

    #[test]
    fn add_and_sub() {
        let a = Fixed::from_int(3);
        let b = Fixed::from_int(2);
        assert_eq!(a.add(b), Fixed::from_int(5));
        assert_eq!(a.sub(b), Fixed::from_int(1));
        assert_eq!(a.add_int(4), Fixed::from_int(7));
        assert_eq!(a.sub_int(1), Fixed::from_int(2));
    }

    #[test]
    fn mul_and_div() {
        let a = Fixed::from_int(6);
        let b = Fixed::from_int(3);
        assert_eq!(a.mul(b), Fixed::from_int(18));
        assert_eq!(a.div(b), Fixed::from_int(2));
        assert_eq!(a.mul_int(2), Fixed::from_int(12));
        assert_eq!(a.div_int(2), Fixed::from_int(3));
    }

    #[test]
    fn round_to_nearest_ties_away_from_zero() {
        // 1/2 in fixed-point, rounds to 1 (away from zero), not 0.
        let half = Fixed::from_raw(F / 2);
        assert_eq!(half.to_int_round(), 1);
        assert_eq!(half.neg().to_int_round(), -1);
    }

    #[test]
    fn decay_like_formula_stays_bounded() {
        // (59/60) * recent_cpu + nice-ish term, the shape of the MLFQ decay.
        let coeff = Fixed::from_int(59).div(Fixed::from_int(60));
        let recent_cpu = Fixed::from_int(10);
        let decayed = coeff.mul(recent_cpu).add_int(1);
        assert!(decayed.to_int_round() <= 11);
    }
}
