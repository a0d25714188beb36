//! Bus-signal loading and per-image GPS artifact generation.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::interpolate::{GpsFix, GpsTrack, LatRef, LonRef};
use super::GpsError;

/// One bus signal: `[timestamp, value]` pairs.
#[derive(Debug, Clone, Deserialize)]
struct Signal {
    values: Vec<(i64, f64)>,
}

/// The four position signals of a vehicle bus-signal dump.
#[derive(Debug, Clone, Deserialize)]
struct BusSignalFile {
    latitude_degree: Signal,
    latitude_direction: Signal,
    longitude_degree: Signal,
    longitude_direction: Signal,
}

/// Build a GPS track from a bus-signal JSON file.
///
/// The four series are parallel arrays; the timestamp of the latitude
/// degree series keys each fix.
pub fn load_bus_signals(path: &Path) -> Result<GpsTrack, GpsError> {
    let content = fs::read_to_string(path).map_err(|e| GpsError::io(path, e))?;
    let file: BusSignalFile =
        serde_json::from_str(&content).map_err(|e| GpsError::parse(path, e.to_string()))?;

    let n = file.latitude_degree.values.len();
    if file.latitude_direction.values.len() != n
        || file.longitude_degree.values.len() != n
        || file.longitude_direction.values.len() != n
    {
        return Err(GpsError::parse(
            path,
            "latitude and longitude series differ in length",
        ));
    }

    let samples = (0..n).map(|i| {
        let (t, lat) = file.latitude_degree.values[i];
        let lat_ref = LatRef::from_signal(file.latitude_direction.values[i].1);
        let lon = file.longitude_degree.values[i].1;
        let lon_ref = LonRef::from_signal(file.longitude_direction.values[i].1);
        (t, GpsFix::new(lat, lat_ref, lon, lon_ref))
    });

    Ok(GpsTrack::new(samples))
}

/// Per-image GPS positions, as read by the custom matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGpsArtifact {
    pub data_description: Vec<String>,
    /// Image name (meta file stem) → fix.
    pub data: BTreeMap<String, GpsFix>,
}

impl ImageGpsArtifact {
    pub fn new(data: BTreeMap<String, GpsFix>) -> Self {
        Self {
            data_description: [
                "latitude_degree",
                "latitude_reference",
                "longitude_degree",
                "longitude_reference",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            data,
        }
    }

    /// Write as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<(), GpsError> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| GpsError::parse(path, e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| GpsError::io(parent, e))?;
            }
        }
        fs::write(path, json).map_err(|e| GpsError::io(path, e))
    }
}

/// Result of resolving image timestamps against a track.
#[derive(Debug, Clone)]
pub struct GpsGeneration {
    pub artifact: ImageGpsArtifact,
    /// Meta files with no position (outside the track or mixed hemispheres).
    pub skipped: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ImageMeta {
    cam_tstamp: i64,
}

/// Interpolate a position for every image meta file under `meta_dir`.
///
/// `meta_dir` holds one folder per camera with a `<image>.json` per image
/// carrying `cam_tstamp`. Images outside the track, or whose bracket
/// straddles a hemisphere change, are skipped with a warning.
pub fn generate_image_gps(track: &GpsTrack, meta_dir: &Path) -> Result<GpsGeneration, GpsError> {
    let mut data = BTreeMap::new();
    let mut skipped = Vec::new();

    for camera_dir in sorted_entries(meta_dir)?.into_iter().filter(|p| p.is_dir()) {
        for meta_path in sorted_entries(&camera_dir)? {
            if meta_path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = meta_path.file_stem().map(|s| s.to_string_lossy().into_owned())
            else {
                continue;
            };

            let content = fs::read_to_string(&meta_path).map_err(|e| GpsError::io(&meta_path, e))?;
            let meta: ImageMeta = serde_json::from_str(&content)
                .map_err(|e| GpsError::parse(&meta_path, e.to_string()))?;

            match track.position_at(meta.cam_tstamp) {
                Ok(Some(fix)) => {
                    data.insert(stem, fix);
                }
                Ok(None) => {
                    tracing::warn!("Cannot find the gps info for {}", meta_path.display());
                    skipped.push(stem);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", meta_path.display(), e);
                    skipped.push(stem);
                }
            }
        }
    }

    Ok(GpsGeneration {
        artifact: ImageGpsArtifact::new(data),
        skipped,
    })
}

fn sorted_entries(dir: &Path) -> Result<Vec<std::path::PathBuf>, GpsError> {
    let mut paths = fs::read_dir(dir)
        .map_err(|e| GpsError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GpsError::io(dir, e))?;
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const BUS_SIGNALS: &str = r#"{
        "latitude_degree": {"unit": "deg", "values": [[100, 48.0], [200, 48.2], [300, 48.4]]},
        "latitude_direction": {"values": [[100, 0], [200, 0], [300, 1]]},
        "longitude_degree": {"values": [[100, 11.0], [200, 11.2], [300, 11.4]]},
        "longitude_direction": {"values": [[100, 0], [200, 0], [300, 0]]},
        "vehicle_speed": {"values": [[100, 3.1]]}
    }"#;

    fn write_meta(dir: &Path, camera: &str, name: &str, tstamp: i64) {
        let cam = dir.join(camera);
        fs::create_dir_all(&cam).unwrap();
        fs::write(
            cam.join(format!("{}.json", name)),
            format!("{{\"cam_tstamp\": {}, \"cam_name\": \"{}\"}}", tstamp, camera),
        )
        .unwrap();
    }

    #[test]
    fn loads_bus_signals() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bus.json");
        fs::write(&path, BUS_SIGNALS).unwrap();

        let track = load_bus_signals(&path).unwrap();
        assert_eq!(track.timestamps(), &[100, 200, 300]);
        let last = track.position_at(300).unwrap().unwrap();
        assert_eq!(last.lat_ref, LatRef::S);
    }

    #[test]
    fn unequal_series_fail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bus.json");
        fs::write(
            &path,
            r#"{"latitude_degree": {"values": [[1, 1.0]]},
                "latitude_direction": {"values": []},
                "longitude_degree": {"values": [[1, 1.0]]},
                "longitude_direction": {"values": [[1, 0]]}}"#,
        )
        .unwrap();

        assert!(matches!(load_bus_signals(&path), Err(GpsError::Parse { .. })));
    }

    #[test]
    fn generates_artifact_and_skips_unresolvable() {
        let dir = tempdir().unwrap();
        let bus = dir.path().join("bus.json");
        fs::write(&bus, BUS_SIGNALS).unwrap();
        let meta = dir.path().join("meta");

        write_meta(&meta, "cam_front_left", "frame_a", 150);
        write_meta(&meta, "cam_front_left", "frame_b", 50);
        write_meta(&meta, "cam_front_right", "frame_c", 250);
        write_meta(&meta, "cam_front_right", "frame_d", 200);

        let track = load_bus_signals(&bus).unwrap();
        let generation = generate_image_gps(&track, &meta).unwrap();
        let data = &generation.artifact.data;

        assert!((data["frame_a"].latitude - 48.1).abs() < 1e-9);
        assert!((data["frame_d"].latitude - 48.2).abs() < 1e-9);
        assert!(!data.contains_key("frame_b"));
        // 250 straddles the N -> S flip at 300.
        assert!(!data.contains_key("frame_c"));
        assert_eq!(generation.skipped, vec!["frame_b".to_string(), "frame_c".to_string()]);
    }

    #[test]
    fn artifact_json_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/imgs_gps.json");

        let mut data = BTreeMap::new();
        data.insert(
            "frame_a".to_string(),
            GpsFix::new(48.1, LatRef::N, 11.1, LonRef::E),
        );
        ImageGpsArtifact::new(data).write(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["data_description"][1], "latitude_reference");
        assert_eq!(value["data"]["frame_a"][1], "N");
        assert_eq!(value["data"]["frame_a"][3], "E");
    }
}
