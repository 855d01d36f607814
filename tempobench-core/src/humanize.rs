//! Human-readable number formatting with SI prefixes.
//!
//! Rates and axis values are rendered against base 1024 with the SI
//! prefix letters. A soft threshold keeps already-scaled mantissas in
//! the smaller unit until they exceed `threshold * base`, which softens
//! edge effects around unit boundaries.

/// kilo, Mega, Giga, Tera, Peta, Exa, Zetta, Yotta.
const BIG_SI_UNITS: [char; 8] = ['k', 'M', 'G', 'T', 'P', 'E', 'Z', 'Y'];
/// milli, micro, nano, pico, femto, atto, zepto, yocto.
const SMALL_SI_UNITS: [char; 8] = ['m', 'u', 'n', 'p', 'f', 'a', 'z', 'y'];

fn to_exponent_and_mantissa(
    value: f64,
    threshold: f64,
    precision: usize,
    one_k: f64,
) -> (String, i32) {
    let sign = if value < 0.0 { "-" } else { "" };
    let val = value.abs();

    // Never exclude values that can't be rendered in `precision` digits.
    let adjusted_threshold = threshold.max(1.0 / 10f64.powi(precision as i32));
    let big_threshold = adjusted_threshold * one_k;
    let small_threshold = adjusted_threshold;

    if val >= one_k {
        let mut scaled = val;
        for i in 0..BIG_SI_UNITS.len() {
            scaled /= one_k;
            if scaled <= big_threshold {
                return (format!("{sign}{scaled:.precision$}"), i as i32 + 1);
            }
        }
        (format!("{sign}{}", trim_fraction(val, precision)), 0)
    } else if val < small_threshold && val > 0.0 {
        let mut scaled = val;
        for i in 0..SMALL_SI_UNITS.len() {
            scaled *= one_k;
            if scaled >= small_threshold {
                return (format!("{sign}{scaled:.precision$}"), -(i as i32) - 1);
            }
        }
        (format!("{sign}{}", trim_fraction(val, precision)), 0)
    } else {
        (format!("{sign}{}", trim_fraction(val, precision)), 0)
    }
}

/// Format an unscaled value, dropping a trailing all-zero fraction so
/// that 1023.0 renders as "1023" while 987.65 keeps its digits.
fn trim_fraction(val: f64, precision: usize) -> String {
    let s = format!("{val:.precision$}");
    match s.split_once('.') {
        Some((int, frac)) if frac.bytes().all(|b| b == b'0') => int.to_string(),
        _ => s,
    }
}

fn exponent_to_prefix(exponent: i32) -> String {
    if exponent == 0 {
        return String::new();
    }
    let index = (exponent.unsigned_abs() as usize) - 1;
    if index >= BIG_SI_UNITS.len() {
        return String::new();
    }
    let array = if exponent > 0 {
        &BIG_SI_UNITS
    } else {
        &SMALL_SI_UNITS
    };
    array[index].to_string()
}

/// Render `value` with an SI prefix against base 1024.
pub fn to_binary_string(value: f64, threshold: f64, precision: usize) -> String {
    let (mantissa, exponent) = to_exponent_and_mantissa(value, threshold, precision, 1024.0);
    format!("{mantissa}{}", exponent_to_prefix(exponent))
}

/// The rate formatting used by reporters: figures up to 1.1x a unit stay
/// in the unit below, one fractional digit.
pub fn human_readable_number(value: f64) -> String {
    to_binary_string(value, 1.1, 1)
}

/// Append "/<value>" to a benchmark name, with the value rounded down to
/// the nearest SI prefix.
pub fn append_human_readable(value: i64, name: &mut String) {
    name.push('/');
    name.push_str(&to_binary_string(value as f64, 1.0, 0));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_boundary() {
        assert_eq!(to_binary_string(1024.0, 1.1, 1), "1.0k");
        assert_eq!(to_binary_string(1023.0, 1.1, 1), "1023");
    }

    #[test]
    fn soft_threshold_keeps_smaller_unit() {
        // 1024k stays in k because the mantissa is below 1.1 * 1024.
        assert_eq!(to_binary_string(1024.0 * 1024.0, 1.1, 1), "1024.0k");
        assert_eq!(to_binary_string(1200.0 * 1024.0, 1.1, 1), "1.2M");
    }

    #[test]
    fn name_decoration_values() {
        let mut name = String::from("F");
        append_human_readable(1, &mut name);
        append_human_readable(8, &mut name);
        append_human_readable(64, &mut name);
        append_human_readable(8192, &mut name);
        assert_eq!(name, "F/1/8/64/8k");
    }

    #[test]
    fn small_and_signed_values() {
        assert_eq!(to_binary_string(0.0, 1.1, 1), "0");
        assert_eq!(to_binary_string(-2048.0, 1.1, 1), "-2.0k");
        // Sub-unit values scale up through the small-prefix table.
        let s = to_binary_string(0.5, 1.1, 1);
        assert_eq!(s, "512.0m");
    }

    #[test]
    fn rate_formatting() {
        assert_eq!(human_readable_number(3.0 * 1024.0 * 1024.0), "3.0M");
        assert_eq!(human_readable_number(500.0), "500");
    }
}
