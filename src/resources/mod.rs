//! Loading from the asset directory.
//!
//! Shader sources live under `<asset root>/materials/`, one vertex and one
//! fragment file per material name. Textures are image files anywhere under
//! the asset root.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::gpu::ProgramSource;

pub mod mesh;
pub mod texture;

/// `./assets` when run from the crate directory, otherwise the copy the build
/// script placed next to the build output.
pub fn asset_root() -> PathBuf {
    let local = Path::new("./").join("assets");
    if local.exists() {
        return local;
    }
    Path::new(env!("OUT_DIR")).join("assets")
}

pub fn load_string(root: &Path, file_name: &str) -> anyhow::Result<String> {
    let path = root.join(file_name);
    std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))
}

pub fn load_binary(root: &Path, file_name: &str) -> anyhow::Result<Vec<u8>> {
    let path = root.join(file_name);
    std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
}

/// Read `materials/<name>_vertex.wgsl` and `materials/<name>_fragment.wgsl`.
pub fn load_program_source(root: &Path, name: &str) -> anyhow::Result<ProgramSource> {
    let vertex = load_string(root, &format!("materials/{name}_vertex.wgsl"))?;
    let fragment = load_string(root, &format!("materials/{name}_fragment.wgsl"))?;
    Ok(ProgramSource {
        name: name.to_string(),
        vertex,
        fragment,
    })
}
