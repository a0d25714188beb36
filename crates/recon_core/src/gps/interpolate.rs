//! Bracket search and linear interpolation of GPS fixes.

use serde::{Deserialize, Serialize};

use super::GpsError;

/// Latitude hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatRef {
    N,
    S,
}

/// Longitude hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LonRef {
    E,
    W,
}

impl LatRef {
    /// Bus-signal encoding: 0 is north, anything else south.
    pub fn from_signal(value: f64) -> Self {
        if value == 0.0 {
            LatRef::N
        } else {
            LatRef::S
        }
    }
}

impl LonRef {
    /// Bus-signal encoding: 0 is east, anything else west.
    pub fn from_signal(value: f64) -> Self {
        if value == 0.0 {
            LonRef::E
        } else {
            LonRef::W
        }
    }
}

/// A position as degree magnitudes plus hemisphere flags.
///
/// Serialized as `[latitude, "N"|"S", longitude, "E"|"W"]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, LatRef, f64, LonRef)", into = "(f64, LatRef, f64, LonRef)")]
pub struct GpsFix {
    pub latitude: f64,
    pub lat_ref: LatRef,
    pub longitude: f64,
    pub lon_ref: LonRef,
}

impl GpsFix {
    pub fn new(latitude: f64, lat_ref: LatRef, longitude: f64, lon_ref: LonRef) -> Self {
        Self {
            latitude,
            lat_ref,
            longitude,
            lon_ref,
        }
    }
}

impl From<(f64, LatRef, f64, LonRef)> for GpsFix {
    fn from((latitude, lat_ref, longitude, lon_ref): (f64, LatRef, f64, LonRef)) -> Self {
        Self::new(latitude, lat_ref, longitude, lon_ref)
    }
}

impl From<GpsFix> for (f64, LatRef, f64, LonRef) {
    fn from(fix: GpsFix) -> Self {
        (fix.latitude, fix.lat_ref, fix.longitude, fix.lon_ref)
    }
}

/// Find the known timestamps around `t` in an ascending slice.
///
/// Returns the largest timestamp `<= t` and the smallest timestamp `> t`.
/// An exact match is its own left bracket.
pub fn nearest_bracket(sorted: &[i64], t: i64) -> (Option<i64>, Option<i64>) {
    let idx = sorted.partition_point(|&x| x <= t);
    let before = idx.checked_sub(1).map(|i| sorted[i]);
    let after = sorted.get(idx).copied();
    (before, after)
}

/// Linearly interpolate between two fixes at time `t`.
///
/// Latitude and longitude magnitudes are interpolated independently; the
/// hemisphere flags are carried over and must agree on both ends.
pub fn interpolate(
    t: i64,
    t1: i64,
    fix1: &GpsFix,
    t2: i64,
    fix2: &GpsFix,
) -> Result<GpsFix, GpsError> {
    if fix1.lat_ref != fix2.lat_ref || fix1.lon_ref != fix2.lon_ref {
        return Err(GpsError::ReferenceMismatch { t1, t2 });
    }

    if t1 == t2 {
        return Ok(*fix1);
    }

    let span = (t2 - t1) as f64;
    let w1 = (t2 - t) as f64 / span;
    let w2 = (t - t1) as f64 / span;

    Ok(GpsFix::new(
        w1 * fix1.latitude + w2 * fix2.latitude,
        fix1.lat_ref,
        w1 * fix1.longitude + w2 * fix2.longitude,
        fix1.lon_ref,
    ))
}

/// Fixes sorted by timestamp.
#[derive(Debug, Clone, Default)]
pub struct GpsTrack {
    timestamps: Vec<i64>,
    fixes: Vec<GpsFix>,
}

impl GpsTrack {
    /// Build a track from unordered `(timestamp, fix)` samples.
    ///
    /// Later samples win when a timestamp repeats.
    pub fn new(samples: impl IntoIterator<Item = (i64, GpsFix)>) -> Self {
        let mut samples: Vec<(i64, GpsFix)> = samples.into_iter().collect();
        samples.sort_by_key(|(t, _)| *t);

        let mut track = Self::default();
        for (t, fix) in samples {
            if track.timestamps.last() == Some(&t) {
                if let Some(last) = track.fixes.last_mut() {
                    *last = fix;
                }
                continue;
            }
            track.timestamps.push(t);
            track.fixes.push(fix);
        }
        track
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Ascending timestamps.
    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    fn fix_at(&self, t: i64) -> Option<&GpsFix> {
        self.timestamps
            .binary_search(&t)
            .ok()
            .map(|i| &self.fixes[i])
    }

    /// Position at time `t`.
    ///
    /// `Ok(None)` when `t` lies outside the track; no extrapolation.
    pub fn position_at(&self, t: i64) -> Result<Option<GpsFix>, GpsError> {
        match nearest_bracket(&self.timestamps, t) {
            (Some(before), _) if before == t => Ok(self.fix_at(before).copied()),
            (Some(before), Some(after)) => {
                match (self.fix_at(before), self.fix_at(after)) {
                    (Some(f1), Some(f2)) => interpolate(t, before, f1, after, f2).map(Some),
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, lat_ref: LatRef, lon: f64, lon_ref: LonRef) -> GpsFix {
        GpsFix::new(lat, lat_ref, lon, lon_ref)
    }

    #[test]
    fn bracket_inside_range() {
        assert_eq!(nearest_bracket(&[10, 20, 30], 25), (Some(20), Some(30)));
    }

    #[test]
    fn bracket_before_first() {
        assert_eq!(nearest_bracket(&[10, 20, 30], 5), (None, Some(10)));
    }

    #[test]
    fn bracket_after_last() {
        assert_eq!(nearest_bracket(&[10, 20, 30], 35), (Some(30), None));
    }

    #[test]
    fn bracket_exact_match_is_left() {
        assert_eq!(nearest_bracket(&[10, 20, 30], 20), (Some(20), Some(30)));
        assert_eq!(nearest_bracket(&[10, 20, 30], 10), (Some(10), Some(20)));
        assert_eq!(nearest_bracket(&[10, 20, 30], 30), (Some(30), None));
    }

    #[test]
    fn bracket_empty() {
        assert_eq!(nearest_bracket(&[], 1), (None, None));
    }

    #[test]
    fn interpolates_midpoint() {
        let f1 = fix(10.0, LatRef::N, 20.0, LonRef::E);
        let f2 = fix(12.0, LatRef::N, 24.0, LonRef::E);

        let got = interpolate(15, 10, &f1, 20, &f2).unwrap();
        assert!((got.latitude - 11.0).abs() < 1e-12);
        assert!((got.longitude - 22.0).abs() < 1e-12);
        assert_eq!(got.lat_ref, LatRef::N);
        assert_eq!(got.lon_ref, LonRef::E);
    }

    #[test]
    fn interpolation_weights_follow_time() {
        let f1 = fix(0.0, LatRef::S, 0.0, LonRef::W);
        let f2 = fix(4.0, LatRef::S, 8.0, LonRef::W);

        let got = interpolate(13, 10, &f1, 14, &f2).unwrap();
        assert!((got.latitude - 3.0).abs() < 1e-12);
        assert!((got.longitude - 6.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_latitude_reference_fails() {
        let f1 = fix(0.1, LatRef::N, 11.0, LonRef::E);
        let f2 = fix(0.1, LatRef::S, 11.0, LonRef::E);

        assert!(matches!(
            interpolate(15, 10, &f1, 20, &f2),
            Err(GpsError::ReferenceMismatch { t1: 10, t2: 20 })
        ));
    }

    #[test]
    fn mismatched_longitude_reference_fails() {
        let f1 = fix(48.0, LatRef::N, 0.1, LonRef::E);
        let f2 = fix(48.0, LatRef::N, 0.1, LonRef::W);
        assert!(interpolate(15, 10, &f1, 20, &f2).is_err());
    }

    #[test]
    fn track_position_lookup() {
        let track = GpsTrack::new(vec![
            (30, fix(3.0, LatRef::N, 30.0, LonRef::E)),
            (10, fix(1.0, LatRef::N, 10.0, LonRef::E)),
            (20, fix(2.0, LatRef::N, 20.0, LonRef::E)),
        ]);

        assert_eq!(track.timestamps(), &[10, 20, 30]);
        assert_eq!(track.position_at(5).unwrap(), None);
        assert_eq!(track.position_at(35).unwrap(), None);
        assert_eq!(track.position_at(30).unwrap().map(|f| f.latitude), Some(3.0));

        let mid = track.position_at(25).unwrap().unwrap();
        assert!((mid.latitude - 2.5).abs() < 1e-12);
    }

    #[test]
    fn fix_serializes_as_tuple() {
        let json = serde_json::to_string(&fix(48.5, LatRef::N, 11.25, LonRef::E)).unwrap();
        assert_eq!(json, "[48.5,\"N\",11.25,\"E\"]");

        let back: GpsFix = serde_json::from_str(&json).unwrap();
        assert_eq!(back.lon_ref, LonRef::E);
    }
}
