//! Fixed-point coordinate decoding shared by the Gerber and Excellon parsers.
//!
//! Both formats write coordinates as fixed-width digit strings with either
//! leading or trailing zeros suppressed. The two parsers differ only in how
//! the format is declared (`%FSLAX36Y36*%` vs `METRIC,LZ` / `;FILE_FORMAT=`),
//! so the decode routine lives here.

/// Which zeros a coordinate token omits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroSuppression {
    /// Leading zeros omitted: digits are right-aligned against the decimal
    /// point, so short tokens are padded on the left.
    Leading,
    /// Trailing zeros omitted: digits are left-aligned, padded on the right.
    Trailing,
}

/// Absolute vs incremental coordinate values (Gerber FS `A`/`I`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordMode {
    Absolute,
    Incremental,
}

/// Fixed-point digit layout: how many integer and decimal digits a full
/// (unsuppressed) coordinate carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFormat {
    pub integer: u8,
    pub decimal: u8,
    pub zero: ZeroSuppression,
}

impl FixedFormat {
    pub fn new(integer: u8, decimal: u8, zero: ZeroSuppression) -> Self {
        Self {
            integer,
            decimal,
            zero,
        }
    }

    fn total_digits(&self) -> usize {
        self.integer as usize + self.decimal as usize
    }
}

/// Decode a coordinate token under the given format.
///
/// Tokens containing an explicit decimal point parse directly. Otherwise the
/// sign is stripped, the digit string is padded per the zero-suppression mode
/// (or defensively truncated to the rightmost digits when over-long), and the
/// result is split at `integer` digits. Returns `None` for empty or
/// non-numeric tokens.
pub fn decode(token: &str, fmt: &FixedFormat) -> Option<f64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    if token.contains('.') {
        return token.parse::<f64>().ok();
    }

    let negative = token.starts_with('-');
    let digits = token.trim_start_matches(['-', '+']);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut total = fmt.total_digits();
    if total == 0 {
        total = digits.len();
    }

    // Over-long token means the declared format is probably wrong; keep the
    // rightmost digits rather than overflowing into absurd coordinates.
    let mut padded = if digits.len() > total {
        digits[digits.len() - total..].to_string()
    } else {
        digits.to_string()
    };

    while padded.len() < total {
        match fmt.zero {
            ZeroSuppression::Leading => padded.insert(0, '0'),
            ZeroSuppression::Trailing => padded.push('0'),
        }
    }

    let raw: i64 = padded.parse().ok()?;
    let value = if fmt.decimal == 0 {
        raw as f64
    } else {
        raw as f64 / 10f64.powi(fmt.decimal as i32)
    };

    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(i: u8, d: u8, zero: ZeroSuppression) -> FixedFormat {
        FixedFormat::new(i, d, zero)
    }

    /// Re-encode a value into a full-width digit string under the format.
    /// Used to check that decode is the inverse of fixed-width encoding.
    fn encode(value: f64, f: &FixedFormat) -> String {
        let scaled = (value.abs() * 10f64.powi(f.decimal as i32)).round() as i64;
        let digits = format!("{:0width$}", scaled, width = f.total_digits());
        if value < 0.0 {
            format!("-{digits}")
        } else {
            digits
        }
    }

    #[test]
    fn test_explicit_decimal_point() {
        let f = fmt(3, 3, ZeroSuppression::Leading);
        assert_eq!(decode("12.345", &f), Some(12.345));
        assert_eq!(decode("-0.5", &f), Some(-0.5));
    }

    #[test]
    fn test_leading_suppression_pads_left() {
        // "14478" under 3.3 L -> "014478" -> 14.478
        let f = fmt(3, 3, ZeroSuppression::Leading);
        assert_eq!(decode("14478", &f), Some(14.478));
    }

    #[test]
    fn test_trailing_suppression_pads_right() {
        // "14478" under 3.3 T -> "144780" -> 144.780
        let f = fmt(3, 3, ZeroSuppression::Trailing);
        assert_eq!(decode("14478", &f), Some(144.78));
    }

    #[test]
    fn test_negative_token() {
        let f = fmt(3, 3, ZeroSuppression::Leading);
        assert_eq!(decode("-14478", &f), Some(-14.478));
    }

    #[test]
    fn test_overlong_token_keeps_rightmost() {
        // 8 digits under a 6-digit format: keep the rightmost 6.
        let f = fmt(3, 3, ZeroSuppression::Leading);
        assert_eq!(decode("99123456", &f), Some(123.456));
    }

    #[test]
    fn test_zero_decimal_digits_is_integer() {
        let f = fmt(4, 0, ZeroSuppression::Leading);
        assert_eq!(decode("42", &f), Some(42.0));
    }

    #[test]
    fn test_empty_and_garbage() {
        let f = fmt(3, 3, ZeroSuppression::Leading);
        assert_eq!(decode("", &f), None);
        assert_eq!(decode("  ", &f), None);
        assert_eq!(decode("12a4", &f), None);
        assert_eq!(decode("-", &f), None);
    }

    #[test]
    fn test_gerber_default_36() {
        // Gerber default X3.6: "2500000" -> 2.5
        let f = fmt(3, 6, ZeroSuppression::Leading);
        assert_eq!(decode("2500000", &f), Some(2.5));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let cases = [
            (fmt(3, 3, ZeroSuppression::Leading), 14.478),
            (fmt(3, 3, ZeroSuppression::Trailing), 14.478),
            (fmt(2, 4, ZeroSuppression::Leading), -1.2345),
            (fmt(3, 6, ZeroSuppression::Leading), 0.000013),
            (fmt(4, 0, ZeroSuppression::Leading), 37.0),
        ];
        for (f, value) in cases {
            let token = encode(value, &f);
            let decoded = decode(&token, &f).unwrap();
            assert!(
                (decoded - value).abs() < 10f64.powi(-(f.decimal as i32)) / 2.0 + 1e-12,
                "format {f:?}: {value} -> {token} -> {decoded}"
            );
        }
    }
}
