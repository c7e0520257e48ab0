use std::path::Path;
use std::time::Instant;

use maskgen_fixtures::{init_logging, mask_grid, write_outputs, MaskGridConfig};

fn main() -> anyhow::Result<()> {
    init_logging();
    let start = Instant::now();
    let config = MaskGridConfig::default();
    let lib = mask_grid(&config)?;
    log::info!(
        "Built {}x{} grid on {} in {:.2?}",
        config.columns,
        config.rows,
        config.layer,
        start.elapsed()
    );
    write_outputs("write_mask_grid", Path::new("."), &[("mask_grid.oas", &lib)])?;
    log::info!("Done in {:.2?}", start.elapsed());
    Ok(())
}
