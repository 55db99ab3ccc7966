//! End-effector trajectory export.

use std::path::Path;

use eyre::Result;
use nalgebra::Vector3;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct TrajectoryRow {
    tick: usize,
    x: f64,
    y: f64,
    z: f64,
}

/// Write one `tick,x,y,z` row per recorded world position.
pub fn write_csv(path: &Path, points: &[Vector3<f64>]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (tick, p) in points.iter().enumerate() {
        writer.serialize(TrajectoryRow {
            tick,
            x: p.x,
            y: p.y,
            z: p.z,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_follow_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.csv");
        let points = [Vector3::new(0.5, 0.0, 0.6), Vector3::new(0.51, 0.002, 0.6)];
        write_csv(&path, &points).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "tick,x,y,z");
        assert_eq!(lines[1], "0,0.5,0.0,0.6");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_trajectory_writes_nothing_but_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_csv(&path, &[]).unwrap();
        assert!(path.exists());
    }
}
