//! Captured camera data as handed over by the simulator's sensor callbacks.

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::config::validate_path_component;

/// Pixel layout of a captured frame. CARLA RGB cameras deliver BGRA.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    #[default]
    Bgra8,
    Rgba8,
    Rgb8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// One camera image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    data: Vec<u8>,
}

impl CameraFrame {
    /// Wrap raw sensor bytes, checking the buffer matches the dimensions.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} bytes for a {}x{} {:?} frame, received {}",
                expected,
                width,
                height,
                format,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Drop alpha and reorder channels to RGB for encoding.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let rgb: Vec<u8> = match self.format {
            PixelFormat::Rgb8 => self.data.clone(),
            PixelFormat::Rgba8 => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            PixelFormat::Bgra8 => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        };
        RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }
}

/// Camera identity used to group output on disk.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub role_name: String,
}

impl CameraDescriptor {
    pub fn new(role_name: impl Into<String>) -> Result<Self> {
        let role_name = role_name.into();
        validate_path_component("camera role name", &role_name)?;
        Ok(Self { role_name })
    }
}

/// Ground-truth label row: `[class_id, xmin, xmax, ymin, ymax]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroundTruthBox {
    pub class_id: u32,
    pub xmin: i32,
    pub xmax: i32,
    pub ymin: i32,
    pub ymax: i32,
}
