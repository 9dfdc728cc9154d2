use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tract_onnx::prelude::*;

use super::onnx::{decode_labelled_outputs, load_plan, load_resized, warm_up_plan, OnnxPlan};
use crate::detect::backend::Detector;
use crate::detect::result::BoundingBox;
use crate::detect::writer::ResultWriter;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// SSD-ResNet34 from the ONNX model zoo (ssd-10).
///
/// Takes an ImageNet-normalised `[1, 3, H, W]` tensor and emits boxes in
/// normalised corner form, so they scale straight to the original image.
pub struct SsdBackend {
    plan: OnnxPlan,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    writer: ResultWriter,
}

impl SsdBackend {
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        output_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let plan = load_plan(
            model_path.as_ref(),
            &[1, 3, height as usize, width as usize],
        )?;
        Ok(Self {
            plan,
            width,
            height,
            confidence_threshold: 0.5,
            writer: ResultWriter::new(output_root, "ssd"),
        })
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

impl Detector for SsdBackend {
    fn name(&self) -> &'static str {
        "ssd"
    }

    fn predict(&mut self, image_path: &Path) -> Result<Vec<BoundingBox>> {
        let (resized, orig_w, orig_h) = load_resized(image_path, self.width, self.height)?;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| {
                let value = resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0;
                (value - MEAN[channel]) / STD[channel]
            },
        );
        let outputs = self
            .plan
            .run(tvec!(input.into_tensor().into()))
            .context("ONNX inference failed")?;
        decode_labelled_outputs(
            &outputs,
            (orig_w as f32, orig_h as f32),
            (orig_w, orig_h),
            self.confidence_threshold,
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        warm_up_plan(&self.plan, &[1, 3, self.height as usize, self.width as usize])
    }

    fn save_result(
        &mut self,
        image_path: &Path,
        bboxes: &[BoundingBox],
        map: &str,
        camera: &str,
        frame_index: &str,
    ) -> Result<()> {
        self.writer
            .write(image_path, bboxes, map, camera, frame_index)
    }
}
