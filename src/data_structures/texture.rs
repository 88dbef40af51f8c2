//! Textures and texture units.
//!
//! [`TextureData`] is the decoded pixel buffer handed over by the image
//! loader, [`Texture`] pairs it with the GPU handle it was uploaded to and
//! [`TextureUnits`] remembers what every unit holds so repeated binds of the
//! same texture never reach the device.

use anyhow::bail;
use image::GenericImageView;
use slotmap::SlotMap;

use crate::gpu::{GpuDevice, TextureHandle};

/// Number of texture units a material can sample from.
pub const MAX_TEXTURE_UNITS: usize = 8;

slotmap::new_key_type! {
    pub struct TextureId;
}

/// Raw pixels, tightly packed rows, `channels` bytes per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> anyhow::Result<Self> {
        if !(1..=4).contains(&channels) {
            bail!("{channels} channels per pixel are not supported");
        }
        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            bail!(
                "{}x{} texture with {} channels needs {} bytes, got {}",
                width,
                height,
                channels,
                expected,
                pixels.len()
            );
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Keep the channel count of the source image (grey, grey+alpha, rgb, rgba).
    pub fn from_image(img: &image::DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        let channels = img.color().channel_count().min(4);
        let pixels = match channels {
            1 => img.to_luma8().into_raw(),
            2 => img.to_luma_alpha8().into_raw(),
            3 => img.to_rgb8().into_raw(),
            _ => img.to_rgba8().into_raw(),
        };
        Self {
            width,
            height,
            channels,
            pixels,
        }
    }

    /// A single pixel of colour `rgba`.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            channels: 4,
            pixels: rgba.to_vec(),
        }
    }

    /// Expand to four channels per pixel; missing colour channels repeat grey,
    /// missing alpha is opaque.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let channels = self.channels as usize;
        self.pixels
            .chunks_exact(channels)
            .flat_map(|p| match channels {
                1 => [p[0], p[0], p[0], 255],
                2 => [p[0], p[0], p[0], p[1]],
                3 => [p[0], p[1], p[2], 255],
                _ => [p[0], p[1], p[2], p[3]],
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct Texture {
    pub handle: TextureHandle,
    pub data: TextureData,
}

/// What each texture unit currently holds.
#[derive(Debug, Default)]
pub struct TextureUnits {
    bound: [Option<TextureId>; MAX_TEXTURE_UNITS],
}

impl TextureUnits {
    /// Bind `texture` to `unit` unless it is already there.
    ///
    /// Returns whether a bind was issued.
    pub fn use_texture<D: GpuDevice>(
        &mut self,
        device: &mut D,
        textures: &SlotMap<TextureId, Texture>,
        texture: TextureId,
        unit: usize,
    ) -> bool {
        if self.bound[unit] == Some(texture) {
            return false;
        }
        let Some(gpu) = textures.get(texture) else {
            panic!("texture {texture:?} is not registered");
        };
        device.bind_texture(unit, gpu.handle);
        self.bound[unit] = Some(texture);
        true
    }

    /// Empty `unit` unless it already is.
    ///
    /// Returns whether an unbind was issued.
    pub fn clear_unit<D: GpuDevice>(&mut self, device: &mut D, unit: usize) -> bool {
        if self.bound[unit].take().is_none() {
            return false;
        }
        device.unbind_texture(unit);
        true
    }

    pub fn bound(&self, unit: usize) -> Option<TextureId> {
        self.bound[unit]
    }
}
