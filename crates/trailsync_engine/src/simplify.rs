//! Route point reduction.
//!
//! A sequential greedy filter: walk the track once, keep a sample only when
//! it moved further than the tolerance from the last kept sample. This is a
//! local reduction, not a globally optimal line simplification, which keeps
//! it O(n) over arbitrarily long tracks.

use trailsync_provider::LocationSample;

/// Reduce `samples` to the subset where consecutive kept points are more
/// than `tolerance_m` meters apart. The first sample is always kept.
///
/// Applying the filter to its own output is the identity: every kept pair
/// already clears the tolerance.
pub fn simplify(samples: &[LocationSample], tolerance_m: f64) -> Vec<LocationSample> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    let mut kept = Vec::with_capacity(samples.len().min(64));
    kept.push(*first);
    let mut anchor = *first;
    for sample in &samples[1..] {
        if haversine_distance(&anchor, sample) > tolerance_m {
            kept.push(*sample);
            anchor = *sample;
        }
    }
    kept
}

/// Great-circle distance between two samples in meters.
fn haversine_distance(a: &LocationSample, b: &LocationSample) -> f64 {
    use geo::{Distance, Haversine, Point};
    let p1 = Point::new(a.longitude, a.latitude);
    let p2 = Point::new(b.longitude, b.latitude);
    Haversine::distance(p1, p2)
}
