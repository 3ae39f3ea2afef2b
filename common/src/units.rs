pub fn fahrenheit(celsius: f64) -> f64 {
    9.0 / 5.0 * celsius + 32.0
}

/// Renders a Fahrenheit value with exactly one decimal, rounding halves up.
pub fn format_fahrenheit(temp_f: f64) -> String {
    let rounded = (temp_f * 10.0 + 0.5).floor() / 10.0;
    format!("{rounded:.1}°F")
}
