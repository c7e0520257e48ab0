use std::path::Path;
use std::time::Instant;

use maskgen_fixtures::{init_logging, input_layer, mask_layer, write_outputs, FixtureConfig};

fn main() -> anyhow::Result<()> {
    init_logging();
    let start = Instant::now();
    let config = FixtureConfig::default();

    log::info!("Starting OASIS file generation...");
    let mask = mask_layer(&config.mask_layer)?;
    let input = input_layer(&config.input_layer)?;
    write_outputs(
        "generate_oasis_test_files",
        Path::new("."),
        &[("mask_layer.oas", &mask), ("input_layer.oas", &input)],
    )?;

    log::info!("Finished generating OASIS files in {:.2?}", start.elapsed());
    Ok(())
}
