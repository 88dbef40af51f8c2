use anyhow::*;
use fs_extra::copy_items;
use fs_extra::dir::CopyOptions;
use std::env;
use std::path::PathBuf;

/// Ship the WGSL materials and textures next to the build output so the binary
/// finds them through `OUT_DIR` when it is not started from the crate root.
fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=assets");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    if !manifest_dir.join("assets").is_dir() {
        return Ok(());
    }

    let out_dir = env::var("OUT_DIR")?;
    let mut copy_options = CopyOptions::new();
    copy_options.overwrite = true;
    let paths_to_copy = vec![manifest_dir.join("assets")];
    copy_items(&paths_to_copy, out_dir, &copy_options)?;

    Ok(())
}
