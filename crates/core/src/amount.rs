//! Arbitrary-precision, scale-aware quantities.
//!
//! Shares, PPS, oracle prices and USD values all exceed 64-bit range and
//! must never be represented as floating point. [`Amount`] pairs a
//! [`BigInt`] magnitude with a decimal scale so call sites can't
//! accidentally mix units, and funnels every division through
//! [`Amount::div_floor`] so truncation only ever happens at an
//! explicit, intentional call site.

use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

/// A non-negative-by-convention, arbitrary-precision integer with an
/// associated decimal scale (number of implied fractional digits).
///
/// `Amount { magnitude: 2_000_000_000, scale: 6 }` represents `2000.000000`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    magnitude: BigInt,
    scale: u32,
}

impl Amount {
    pub fn zero(scale: u32) -> Self {
        Self {
            magnitude: BigInt::zero(),
            scale,
        }
    }

    pub fn from_raw(magnitude: impl Into<BigInt>, scale: u32) -> Self {
        Self {
            magnitude: magnitude.into(),
            scale,
        }
    }

    pub fn magnitude(&self) -> &BigInt {
        &self.magnitude
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.magnitude < BigInt::zero()
    }

    /// Rescales `self` to `target_scale`, losslessly when scaling up and
    /// with an explicit floor when scaling down. Used only at storage or
    /// wire boundaries; internal pipeline math keeps native scales and
    /// uses [`Amount::mul_then_scale`] instead.
    pub fn rescale(&self, target_scale: u32) -> Self {
        if target_scale == self.scale {
            return self.clone();
        }
        if target_scale > self.scale {
            let factor = BigInt::from(10u32).pow(target_scale - self.scale);
            Self {
                magnitude: &self.magnitude * factor,
                scale: target_scale,
            }
        } else {
            let factor = BigInt::from(10u32).pow(self.scale - target_scale);
            Self {
                magnitude: self.magnitude.div_floor(&factor),
                scale: target_scale,
            }
        }
    }

    pub fn checked_add(&self, other: &Self) -> Self {
        assert_eq!(self.scale, other.scale, "Amount addition requires equal scale");
        Self {
            magnitude: &self.magnitude + &other.magnitude,
            scale: self.scale,
        }
    }

    pub fn checked_sub(&self, other: &Self) -> Self {
        assert_eq!(self.scale, other.scale, "Amount subtraction requires equal scale");
        Self {
            magnitude: &self.magnitude - &other.magnitude,
            scale: self.scale,
        }
    }

    /// Multiplies two scaled quantities and re-expresses the result at
    /// `out_scale`, doing the multiply before the divide to preserve
    /// precision, and flooring exactly once.
    ///
    /// `self.scale + other.scale` is the natural scale of the raw
    /// product; dividing by `10^(natural - out_scale)` re-expresses it
    /// at the caller's target scale.
    pub fn mul_then_scale(&self, other: &Self, out_scale: u32) -> Self {
        let product = &self.magnitude * &other.magnitude;
        let natural_scale = self.scale + other.scale;

        if natural_scale >= out_scale {
            let divisor = BigInt::from(10u32).pow(natural_scale - out_scale);
            Self {
                magnitude: product.div_floor(&divisor),
                scale: out_scale,
            }
        } else {
            let multiplier = BigInt::from(10u32).pow(out_scale - natural_scale);
            Self {
                magnitude: product * multiplier,
                scale: out_scale,
            }
        }
    }

    /// Applies an integer rate (droplets per USD per tick) and floors to
    /// a whole-number droplet count. This is the one place in the
    /// pipeline where a fractional quantity becomes an integer count.
    pub fn droplets_at_rate(&self, rate_per_usd_per_tick: u64) -> BigInt {
        let scaled = &self.magnitude * BigInt::from(rate_per_usd_per_tick);
        let divisor = BigInt::from(10u32).pow(self.scale);
        scaled.div_floor(&divisor)
    }

    /// Lossy conversion for logging/metrics only; never used in accrual
    /// arithmetic.
    pub fn to_f64_lossy(&self) -> f64 {
        let divisor = 10f64.powi(self.scale as i32);
        self.magnitude.to_f64().unwrap_or(f64::NAN) / divisor
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.magnitude);
        }

        let negative = self.magnitude < BigInt::zero();
        let abs = self.magnitude.magnitude().to_str_radix(10);
        let scale = self.scale as usize;

        let padded = if abs.len() <= scale {
            format!("{:0>width$}", abs, width = scale + 1)
        } else {
            abs
        };

        let (int_part, frac_part) = padded.split_at(padded.len() - scale);

        if negative {
            write!(f, "-{int_part}.{frac_part}")
        } else {
            write!(f, "{int_part}.{frac_part}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_decimal_string() {
        let a = Amount::from_raw(2_000_000_000, 6);
        assert_eq!(a.to_string(), "2000.000000");
    }

    #[test]
    fn displays_small_fraction() {
        let a = Amount::from_raw(5, 6);
        assert_eq!(a.to_string(), "0.000005");
    }

    #[test]
    fn multiply_then_scale_through_two_hops() {
        // 1e18 shares, PPS 1e18 (scale 18), oracle price 2000e8 (scale 8), USD scale 6.
        let shares = Amount::from_raw(BigInt::from(10u64).pow(18), 18);
        let pps = Amount::from_raw(BigInt::from(10u64).pow(18), 18);
        let underlying = shares.mul_then_scale(&pps, 18);
        assert_eq!(underlying, Amount::from_raw(BigInt::from(10u64).pow(18), 18));

        let price = Amount::from_raw(2000i64 * 100_000_000, 8);
        let usd = underlying.mul_then_scale(&price, 6);
        assert_eq!(usd, Amount::from_raw(2_000_000_000i64, 6));

        let droplets = usd.droplets_at_rate(1);
        assert_eq!(droplets, BigInt::from(2000));
    }

    #[test]
    fn floor_happens_once() {
        // 1 wei held at a fractional price must not round up anywhere but the final step.
        let shares = Amount::from_raw(1, 18);
        let pps = Amount::from_raw(BigInt::from(10u64).pow(18), 18);
        let underlying = shares.mul_then_scale(&pps, 18);
        assert_eq!(underlying.magnitude(), &BigInt::from(1));

        let price = Amount::from_raw(1, 8); // $0.00000001
        let usd = underlying.mul_then_scale(&price, 6);
        assert!(usd.is_zero());
        assert_eq!(usd.droplets_at_rate(1), BigInt::from(0));
    }
}
