use anyhow::{Context, Result};
use env_logger::Env;
use log::info;

use tracknav::detector;
use tracknav::output;
use tracknav::propagator::Propagator;
use tracknav::scan::{GeometryScan, ScanSummary};
use tracknav::settings;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = settings::load_config()?;
    info!("{settings}");

    let geometry = detector::build(&settings.detector, &settings.layer_creator)
        .context("building the detector geometry")?;

    let propagator = Propagator::new(&geometry, settings.navigator);
    let scan = GeometryScan::new(propagator, settings.propagation, settings.scan)?;
    let records = scan.run();
    let summary = ScanSummary::from_records(&records);
    info!("{summary}");

    let dir = output::writeup(&settings, &geometry, &records, &summary)?;
    info!("results written to {}", dir.display());
    Ok(())
}
