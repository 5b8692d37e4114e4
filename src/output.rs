use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::geometry::TrackingGeometry;
use crate::scan::{ScanSummary, TrackRecord};
use crate::settings::Settings;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagator::{PropagationOutcome, PropagationResult};
    use nalgebra::Vector3;

    fn record(index: usize, x0: f64) -> TrackRecord {
        TrackRecord {
            index,
            eta: 0.1 * index as f64,
            phi: -0.5,
            direction: Vector3::x(),
            result: PropagationResult {
                material_in_x0: x0,
                material_in_l0: 0.5 * x0,
                outcome: PropagationOutcome::GeometryExhausted,
                ..Default::default()
            },
        }
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tracknav-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn material_table_one_row_per_track() {
        let dir = scratch("table");
        fs::create_dir_all(&dir).unwrap();
        write_material_table(&dir, &[record(0, 0.01), record(1, 0.02)]).unwrap();

        let text = fs::read_to_string(dir.join(MATERIAL_FILE)).unwrap();
        let rows: Vec<Vec<&str>> = text
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(|l| l.split_whitespace().collect())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "1");
        assert_eq!(rows[1][3].parse::<f64>().unwrap(), 0.02);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn tracks_written_as_json() {
        let dir = scratch("json");
        fs::create_dir_all(&dir).unwrap();
        write_tracks(&dir, &[record(3, 0.0)]).unwrap();

        let text = fs::read_to_string(dir.join(TRACKS_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["index"], 3);
        assert_eq!(value[0]["result"]["outcome"], "geometry_exhausted");
        fs::remove_dir_all(&dir).unwrap();
    }
}

pub const TRACKS_FILE: &str = "tracks.json";
pub const MATERIAL_FILE: &str = "material.dat";
pub const SETTINGS_FILE: &str = "settings.toml";
pub const SUMMARY_FILE: &str = "summary.txt";

fn create(dir: &Path, name: &str) -> Result<BufWriter<File>> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Every track with its hits as pretty-printed JSON.
pub fn write_tracks(dir: &Path, records: &[TrackRecord]) -> Result<()> {
    let mut writer = create(dir, TRACKS_FILE)?;
    serde_json::to_writer_pretty(&mut writer, records).context("serializing tracks")?;
    writer.flush()?;
    Ok(())
}

/// One row per track: index, eta, phi, material in X0 and L0, hit count.
pub fn write_material_table(dir: &Path, records: &[TrackRecord]) -> Result<()> {
    let mut writer = create(dir, MATERIAL_FILE)?;
    writeln!(writer, "# index eta phi x0 l0 hits")?;
    for record in records {
        writeln!(
            writer,
            "{} {} {} {} {} {}",
            record.index,
            record.eta,
            record.phi,
            record.result.material_in_x0,
            record.result.material_in_l0,
            record.result.hits.len()
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// The effective settings, so a run can be repeated.
pub fn write_settings(dir: &Path, settings: &Settings) -> Result<()> {
    let text = toml::to_string_pretty(settings).context("serializing settings")?;
    let mut writer = create(dir, SETTINGS_FILE)?;
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(())
}

pub fn write_summary(dir: &Path, geometry: &TrackingGeometry, summary: &ScanSummary) -> Result<()> {
    let mut writer = create(dir, SUMMARY_FILE)?;
    writeln!(writer, "tracknav run finished {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(writer)?;
    writeln!(writer, "Geometry ({} volumes):", geometry.len())?;
    write!(writer, "{geometry}")?;
    writeln!(writer)?;
    writeln!(writer, "{summary}")?;
    writer.flush()?;
    Ok(())
}

/// Writes all output files into `settings.directory` and returns it.
pub fn writeup(
    settings: &Settings,
    geometry: &TrackingGeometry,
    records: &[TrackRecord],
    summary: &ScanSummary,
) -> Result<PathBuf> {
    let dir = settings.directory.clone();
    fs::create_dir_all(&dir).with_context(|| format!("creating output directory {}", dir.display()))?;

    write_tracks(&dir, records)?;
    write_material_table(&dir, records)?;
    write_settings(&dir, settings)?;
    write_summary(&dir, geometry, summary)?;
    Ok(dir)
}
