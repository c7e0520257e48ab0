use std::path::Path;

use maskgen_fixtures::{init_logging, simple_rect, write_outputs};

fn main() -> anyhow::Result<()> {
    init_logging();
    let lib = simple_rect()?;
    write_outputs("create_simple_oasis", Path::new("."), &[("simple_test.oas", &lib)])?;
    Ok(())
}
