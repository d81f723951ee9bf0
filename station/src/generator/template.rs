use std::f64::consts::PI;

/// Normalised thrust of a progressive-regressive grain at `fraction` of the
/// burn (0..=1). Peaks at 1.0 near 40% of the burn and tails off.
pub fn thrust_curve(fraction: f64) -> f64 {
    if !(0.0..=1.0).contains(&fraction) {
        return 0.0;
    }
    let rise = (fraction / 0.08).min(1.0);
    let body = 0.75 + 0.25 * (PI * fraction / 0.8).sin().max(0.0);
    let tail = if fraction > 0.85 {
        (1.0 - (fraction - 0.85) / 0.15).max(0.0)
    } else {
        1.0
    };
    rise * body * tail
}

/// Chamber pressure tracks thrust with a slightly slower rise.
pub fn pressure_curve(fraction: f64) -> f64 {
    thrust_curve(fraction).powf(1.1)
}
