use std::path::Path;

use maskgen_fixtures::{capture_demo, init_logging, shapes_on, write_outputs, CAPTURE_RESULT};

fn main() -> anyhow::Result<()> {
    init_logging();
    let lib = capture_demo()?;
    log::info!(
        "{} polygon(s) on the AND layer {}",
        shapes_on(&lib, CAPTURE_RESULT).len(),
        CAPTURE_RESULT
    );
    write_outputs("pattern_capture", Path::new("."), &[("pattern_capture.gds", &lib)])?;
    Ok(())
}
