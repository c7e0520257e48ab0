use std::path::Path;

use maskgen_fixtures::{init_logging, multi_poly, write_outputs};

fn main() -> anyhow::Result<()> {
    init_logging();
    let lib = multi_poly()?;
    let manifest = write_outputs(
        "create_multi_poly_gds",
        Path::new("."),
        &[("test_multi_poly.gds", &lib)],
    )?;
    log::info!(
        "Saved test_multi_poly.gds with {} polygons in cell 'MultiPolyCell'",
        manifest.total_shapes()
    );
    Ok(())
}
