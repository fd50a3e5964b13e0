use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

const MAX_FRACTION_DIGITS: usize = 18;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const DISPLAY_FRACTION_DIGITS: u32 = 6;

/// Exact non-negative rational quantity, always stored in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Amount {
    num: u128,
    den: u128,
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Amount {
    pub const ZERO: Amount = Amount { num: 0, den: 1 };
    pub const ONE: Amount = Amount { num: 1, den: 1 };

    pub fn from_integer(value: u64) -> Self {
        Self {
            num: value as u128,
            den: 1,
        }
    }

    pub fn from_ratio(num: u128, den: u128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        Some(Self::reduced(num, den))
    }

    /// Parses plain decimal text such as `3`, `0.25` or `.5`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if fraction.len() > MAX_FRACTION_DIGITS {
            return None;
        }
        let all_digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
        if !all_digits(whole) || !all_digits(fraction) {
            return None;
        }

        let whole_value = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().ok()?
        };
        let den = 10u128.pow(fraction.len() as u32);
        let fraction_value = if fraction.is_empty() {
            0
        } else {
            fraction.parse::<u128>().ok()?
        };
        let num = whole_value.checked_mul(den)?.checked_add(fraction_value)?;
        Some(Self::reduced(num, den))
    }

    pub fn is_zero(self) -> bool {
        self.num == 0
    }

    pub fn numerator(self) -> u128 {
        self.num
    }

    pub fn denominator(self) -> u128 {
        self.den
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        let g = gcd(self.den, rhs.den);
        let left_scale = rhs.den / g;
        let right_scale = self.den / g;
        let den = self.den.checked_mul(left_scale)?;
        let num = self
            .num
            .checked_mul(left_scale)?
            .checked_add(rhs.num.checked_mul(right_scale)?)?;
        Some(Self::reduced(num, den))
    }

    pub fn checked_mul(self, rhs: Amount) -> Option<Amount> {
        let g1 = gcd(self.num, rhs.den).max(1);
        let g2 = gcd(rhs.num, self.den).max(1);
        let num = (self.num / g1).checked_mul(rhs.num / g2)?;
        let den = (self.den / g2).checked_mul(rhs.den / g1)?;
        Some(Self::reduced(num, den))
    }

    pub fn checked_div(self, rhs: Amount) -> Option<Amount> {
        if rhs.is_zero() {
            return None;
        }
        self.checked_mul(Amount {
            num: rhs.den,
            den: rhs.num,
        })
    }

    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Interprets the amount as seconds and truncates to whole nanoseconds.
    pub fn as_duration_seconds(self) -> Option<Duration> {
        let whole_seconds = self.num / self.den;
        let remainder = self.num % self.den;
        let nanos = remainder.checked_mul(NANOS_PER_SECOND)? / self.den;
        let secs = u64::try_from(whole_seconds).ok()?;
        Some(Duration::new(secs, nanos as u32))
    }

    fn reduced(num: u128, den: u128) -> Self {
        if num == 0 {
            return Self::ZERO;
        }
        let g = gcd(num, den);
        Self {
            num: num / g,
            den: den / g,
        }
    }
}

impl fmt::Display for Amount {
    /// Exact when the value terminates within 18 decimal places, else truncated to 6.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.num / self.den;
        let remainder = self.num % self.den;
        if remainder == 0 {
            return write!(f, "{whole}");
        }
        let digits = (1..=MAX_FRACTION_DIGITS as u32)
            .find(|digits| 10u128.pow(*digits) % self.den == 0)
            .unwrap_or(DISPLAY_FRACTION_DIGITS);
        let fraction = remainder.saturating_mul(10u128.pow(digits)) / self.den;
        let padded = format!("{fraction:0width$}", width = digits as usize);
        let trimmed = padded.trim_end_matches('0');
        if trimmed.is_empty() {
            write!(f, "{whole}")
        } else {
            write!(f, "{whole}.{trimmed}")
        }
    }
}

impl FromStr for Amount {
    type Err = InvalidAmount;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Amount::parse(raw).ok_or(InvalidAmount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidAmount;

impl fmt::Display for InvalidAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected a non-negative decimal amount")
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(raw: &str) -> Amount {
        Amount::parse(raw).expect("amount")
    }

    #[test]
    fn parse_accepts_plain_decimals() {
        assert_eq!(amount("3"), Amount::from_integer(3));
        assert_eq!(amount("2.50"), Amount::from_ratio(5, 2).expect("ratio"));
        assert_eq!(amount(".5"), Amount::from_ratio(1, 2).expect("ratio"));
        assert_eq!(amount(" 0 "), Amount::ZERO);
    }

    #[test]
    fn parse_rejects_signs_exponents_and_garbage() {
        for raw in ["-1", "1e3", "", ".", "abc", "1.2.3", "+4"] {
            assert!(Amount::parse(raw).is_none(), "{raw} should not parse");
        }
    }

    #[test]
    fn division_then_multiplication_stays_exact() {
        let third = Amount::ONE
            .checked_div(Amount::from_integer(3))
            .expect("div");
        let total = third
            .checked_add(third)
            .and_then(|sum| sum.checked_add(third))
            .expect("sum");
        assert_eq!(total, Amount::ONE);
    }

    #[test]
    fn division_by_zero_is_none() {
        assert!(Amount::ONE.checked_div(Amount::ZERO).is_none());
        assert!(Amount::from_ratio(1, 0).is_none());
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(amount("7.5").to_string(), "7.5");
        assert_eq!(amount("12").to_string(), "12");
        assert_eq!(amount("0.0000001").to_string(), "0.0000001");
        assert_eq!(
            Amount::from_ratio(1, 3).expect("ratio").to_string(),
            "0.333333"
        );
    }

    #[test]
    fn duration_conversion_truncates_to_nanoseconds() {
        assert_eq!(
            amount("2.5").as_duration_seconds(),
            Some(Duration::from_millis(2_500))
        );
        assert_eq!(
            Amount::from_ratio(1, 3)
                .expect("ratio")
                .as_duration_seconds(),
            Some(Duration::new(0, 333_333_333))
        );
    }
}
