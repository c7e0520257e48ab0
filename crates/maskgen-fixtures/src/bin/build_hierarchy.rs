use std::path::Path;

use maskgen_fixtures::{hierarchy_demo, init_logging, write_outputs};

fn main() -> anyhow::Result<()> {
    init_logging();
    let lib = hierarchy_demo()?;
    for cell in lib.cells() {
        log::info!(
            "Cell '{}': {} shapes, {} instances",
            cell.name,
            cell.geometry_count(),
            cell.instance_count()
        );
        for inst in &cell.instances {
            let offset = inst.transform.offset;
            log::info!("  {} at ({}, {})", inst.cell_name, offset.x, offset.y);
        }
    }
    write_outputs("build_hierarchy", Path::new("."), &[("hierarchy.gds", &lib)])?;
    Ok(())
}
