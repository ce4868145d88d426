//! Locale-independent number formatting and unit conversion.
//!
//! Every function here is pure. Controllers parse `.` as the decimal separator
//! regardless of host locale, which is also what Rust's formatter produces.

/// Values closer to zero than this are treated as zero.
pub const EPSILON: f64 = 1e-9;

pub fn near_zero(v: f64) -> bool {
    v.abs() < EPSILON
}

/// Fixed-point rendering with `decimals` digits after the point.
///
/// Negative zero (including values that round to zero) is printed without
/// its sign, so `fixed(-0.0001, 3)` gives `"0.000"`.
pub fn fixed(v: f64, decimals: usize) -> String {
    let s = format!("{v:.decimals$}");
    match s.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => s,
    }
}

/// Shortest rendering with six significant digits, matching C's `%g`.
pub fn general(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }

    // `{:e}` rounds to the requested precision first, so the exponent already
    // accounts for carries like 999999.5 -> 1e6.
    let sci = format!("{v:.5e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    } else {
        let decimals = (5 - exponent) as usize;
        let s = trim_fraction(&format!("{v:.decimals$}")).to_string();
        if s == "-0" { "0".to_string() } else { s }
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LengthUnit {
    #[default]
    Millimeter,
    Meter,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AngleUnit {
    #[default]
    Degree,
    Radian,
}

/// Unit conventions of a controller language.
///
/// Program data is always in millimetres and degrees; dialects convert through
/// this before formatting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NumberFormat {
    pub length: LengthUnit,
    pub angle: AngleUnit,
}

impl NumberFormat {
    pub const M_RAD: Self = Self {
        length: LengthUnit::Meter,
        angle: AngleUnit::Radian,
    };

    pub fn length(&self, mm: f64) -> f64 {
        match self.length {
            LengthUnit::Millimeter => mm,
            LengthUnit::Meter => mm * 0.001,
        }
    }

    pub fn angle(&self, degrees: f64) -> f64 {
        match self.angle {
            AngleUnit::Degree => degrees,
            AngleUnit::Radian => degrees.to_radians(),
        }
    }
}
