use std::path::Path;

use anyhow::Context;

use crate::{data_structures::texture::TextureData, resources::load_binary};

/// Decode an encoded image (png, jpeg, ...) into raw pixels.
pub fn decode_texture(bytes: &[u8]) -> anyhow::Result<TextureData> {
    let img = image::load_from_memory(bytes).context("decoding image")?;
    Ok(TextureData::from_image(&img))
}

pub fn load_texture(root: &Path, file_name: &str) -> anyhow::Result<TextureData> {
    let bytes = load_binary(root, file_name)?;
    decode_texture(&bytes).with_context(|| format!("decoding {file_name}"))
}
