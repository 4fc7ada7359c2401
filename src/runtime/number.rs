use std::fmt;

/// Two-variant numeric tower. A `Double` holding a value exactly
/// representable as `i32` is never produced by [`Number::from_f64`];
/// construction narrows it to `Integer` first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i32),
    Double(f64),
}

impl Number {
    pub fn from_f64(value: f64) -> Number {
        let narrowed = value as i32;

        if narrowed as f64 == value {
            Number::Integer(narrowed)
        } else {
            Number::Double(value)
        }
    }

    pub fn from_i64(value: i64) -> Number {
        if value >= i32::MIN as i64 && value <= i32::MAX as i64 {
            Number::Integer(value as i32)
        } else {
            Number::Double(value as f64)
        }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Double(d) => d,
        }
    }

    /// Truncating conversion.
    pub fn to_i32(self) -> i32 {
        match self {
            Number::Integer(i) => i,
            Number::Double(d) => d as i32,
        }
    }

    pub fn add(self, rhs: Number) -> Number {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => Number::from_i64(a as i64 + b as i64),
            (a, b) => Number::from_f64(a.to_f64() + b.to_f64()),
        }
    }

    pub fn sub(self, rhs: Number) -> Number {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => Number::from_i64(a as i64 - b as i64),
            (a, b) => Number::from_f64(a.to_f64() - b.to_f64()),
        }
    }

    pub fn mul(self, rhs: Number) -> Number {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => Number::from_i64(a as i64 * b as i64),
            (a, b) => Number::from_f64(a.to_f64() * b.to_f64()),
        }
    }

    pub fn div(self, rhs: Number) -> Number {
        Number::from_f64(ddiv(self.to_f64(), rhs.to_f64()))
    }

    pub fn modulo(self, rhs: Number) -> Number {
        Number::from_f64(dmod(self.to_f64(), rhs.to_f64()))
    }

    pub fn pow(self, rhs: Number) -> Number {
        Number::from_f64(dpow(self.to_f64(), rhs.to_f64()))
    }

    pub fn neg(self) -> Number {
        match self {
            Number::Integer(i) => Number::from_i64(-(i as i64)),
            Number::Double(d) => Number::from_f64(-d),
        }
    }

    pub fn lt(self, rhs: Number) -> bool {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => a < b,
            (a, b) => a.to_f64() < b.to_f64(),
        }
    }

    pub fn lteq(self, rhs: Number) -> bool {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => a <= b,
            (a, b) => a.to_f64() <= b.to_f64(),
        }
    }

    pub fn raw_eq(self, rhs: Number) -> bool {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            (a, b) => a.to_f64() == b.to_f64(),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Number::Integer(i) => write!(f, "{i}"),
            Number::Double(d) => {
                if d.is_nan() {
                    write!(f, "nan")
                } else if d.is_infinite() {
                    write!(f, "{}", if d > 0.0 { "inf" } else { "-inf" })
                } else {
                    write!(f, "{d}")
                }
            }
        }
    }
}

/// Division without a hardware trap on zero: `x / 0` is signed infinity,
/// `0 / 0` is nan.
pub fn ddiv(lhs: f64, rhs: f64) -> f64 {
    if rhs != 0.0 {
        lhs / rhs
    } else if lhs > 0.0 {
        f64::INFINITY
    } else if lhs == 0.0 {
        f64::NAN
    } else {
        f64::NEG_INFINITY
    }
}

/// Floored modulo: `lhs - rhs * floor(lhs / rhs)`, nan when `rhs` is zero.
pub fn dmod(lhs: f64, rhs: f64) -> f64 {
    if rhs != 0.0 {
        lhs - rhs * (lhs / rhs).floor()
    } else {
        f64::NAN
    }
}

pub fn dpow(lhs: f64, rhs: f64) -> f64 {
    lhs.powf(rhs)
}

/// String to number coercion: optional sign, decimal or `0x` hex integers,
/// and float syntax. Rejects the textual infinities `str::parse` accepts.
pub fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();

    if text.is_empty() {
        return None;
    }

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let number = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        if hex.is_empty() {
            return None;
        }

        // accumulation wraps modulo 2^64 rather than rejecting long literals
        let mut acc: u64 = 0;

        for byte in hex.bytes() {
            let digit = char::from(byte).to_digit(16)?;
            acc = acc.wrapping_mul(16).wrapping_add(u64::from(digit));
        }

        Number::from_i64(acc as i64)
    } else if let Ok(integer) = digits.parse::<i64>() {
        Number::from_i64(integer)
    } else {
        if digits
            .bytes()
            .any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E')
        {
            return None;
        }

        Number::from_f64(digits.parse::<f64>().ok()?)
    };

    Some(if negative { number.neg() } else { number })
}
