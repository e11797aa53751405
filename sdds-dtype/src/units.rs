//! Composition of unit strings for derived quantities.

fn is_blank(units: &str) -> bool {
    units.trim().is_empty()
}

/// Units of a product `a * b`: `"a b"`, or whichever side is not blank.
pub fn multiply_units(a: &str, b: &str) -> String {
    match (is_blank(a), is_blank(b)) {
        (false, false) => format!("{a} {b}"),
        (false, true) => a.to_string(),
        (true, false) => b.to_string(),
        (true, true) => String::new(),
    }
}

/// Units of a quotient `a / b`: `"a/(b)"`, or `"1/(b)"` when `a` is blank.
pub fn divide_units(a: &str, b: &str) -> String {
    match (is_blank(a), is_blank(b)) {
        (false, false) => format!("{a}/({b})"),
        (false, true) => a.to_string(),
        (true, false) => format!("1/({b})"),
        (true, true) => String::new(),
    }
}

/// Units of a frequency measured against an independent quantity in `units`.
///
/// Enclosing parentheses are removed and a `1/(x)` wrapper is inverted, so `"s"` gives `"1/s"`,
/// `"m s"` gives `"1/(m s)"`, and `"1/(Hz)"` gives `"Hz"`.
pub fn frequency_units(units: &str) -> String {
    let mut units = units.trim();
    let mut reciprocal = false;
    loop {
        if units.len() >= 2 && units.starts_with('(') && units.ends_with(')') {
            units = &units[1..units.len() - 1];
        } else if units.len() >= 4 && units.starts_with("1/(") && units.ends_with(')') {
            units = &units[3..units.len() - 1];
            reciprocal = !reciprocal;
        } else {
            break;
        }
    }

    if is_blank(units) {
        String::new()
    } else if reciprocal {
        units.to_string()
    } else if units.contains(' ') {
        format!("1/({units})")
    } else {
        format!("1/{units}")
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("m", "s", "m s")]
    #[case("m", "", "m")]
    #[case(" ", "s", "s")]
    #[case("", "", "")]
    fn multiply(#[case] a: &str, #[case] b: &str, #[case] expected: &str) {
        assert_eq!(multiply_units(a, b), expected);
    }

    #[rstest]
    #[case("m", "s", "m/(s)")]
    #[case("", "s", "1/(s)")]
    #[case("m", "", "m")]
    #[case("", "", "")]
    fn divide(#[case] a: &str, #[case] b: &str, #[case] expected: &str) {
        assert_eq!(divide_units(a, b), expected);
    }

    #[rstest]
    #[case("s", "1/s")]
    #[case("(s)", "1/s")]
    #[case("m s", "1/(m s)")]
    #[case("1/(Hz)", "Hz")]
    #[case("((1/(turns)))", "turns")]
    #[case("", "")]
    fn frequency(#[case] units: &str, #[case] expected: &str) {
        assert_eq!(frequency_units(units), expected);
    }
}
