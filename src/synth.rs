use rand::Rng;

/// Rough baseline when the routing engine gives no duration: 5 min per km.
pub const MIN_PER_KM: f64 = 5.0;
pub const DEFAULT_DISTANCE_M: f64 = 1000.0;
pub const DEFAULT_COUNT: usize = 10;

/// Baseline minutes for a route estimate. Zero values count as absent.
pub fn baseline_min(duration_s: Option<f64>, distance_m: Option<f64>) -> f64 {
    match duration_s.filter(|d| *d != 0.0) {
        Some(d) => d / 60.0,
        None => {
            let dist = distance_m.filter(|d| *d != 0.0).unwrap_or(DEFAULT_DISTANCE_M);
            dist / 1000.0 * MIN_PER_KM
        }
    }
}

/// Build a synthetic short history around a single route estimate:
/// `count` draws of ±10% jitter around the baseline, floored at one minute.
pub fn synthesize<R: Rng + ?Sized>(
    rng: &mut R,
    duration_s: Option<f64>,
    distance_m: Option<f64>,
    count: usize,
) -> Vec<f64> {
    let base_min = baseline_min(duration_s, distance_m);
    (0..count)
        .map(|_| {
            let u: f64 = rng.random();
            (base_min * (0.9 + 0.2 * u)).max(1.0)
        })
        .collect()
}
