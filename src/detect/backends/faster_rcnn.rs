use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use super::onnx::{decode_labelled_outputs, load_plan, load_resized, warm_up_plan, OnnxPlan};
use crate::detect::backend::Detector;
use crate::detect::result::BoundingBox;
use crate::detect::writer::ResultWriter;

/// Per-channel BGR means the Detectron-style export subtracts.
const BGR_MEAN: [f32; 3] = [102.9801, 115.9465, 122.7717];

/// Faster R-CNN R-50-FPN from the ONNX model zoo (FasterRCNN-10).
///
/// Input is an unbatched `[3, H, W]` BGR tensor in 0..255 with the means
/// removed; both sides must be multiples of 32. Boxes come back in input
/// pixel space.
pub struct FasterRcnnBackend {
    plan: OnnxPlan,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    writer: ResultWriter,
}

impl FasterRcnnBackend {
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        output_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        if width % 32 != 0 || height % 32 != 0 {
            return Err(anyhow!(
                "faster_rcnn input size {}x{} must be a multiple of 32",
                width,
                height
            ));
        }
        let plan = load_plan(model_path.as_ref(), &[3, height as usize, width as usize])?;
        Ok(Self {
            plan,
            width,
            height,
            confidence_threshold: 0.5,
            writer: ResultWriter::new(output_root, "faster_rcnn"),
        })
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

impl Detector for FasterRcnnBackend {
    fn name(&self) -> &'static str {
        "faster_rcnn"
    }

    fn predict(&mut self, image_path: &Path) -> Result<Vec<BoundingBox>> {
        let (resized, orig_w, orig_h) = load_resized(image_path, self.width, self.height)?;
        let input = tract_ndarray::Array3::from_shape_fn(
            (3, self.height as usize, self.width as usize),
            |(channel, y, x)| {
                // RGB pixel, BGR tensor.
                let value = resized.get_pixel(x as u32, y as u32)[2 - channel] as f32;
                value - BGR_MEAN[channel]
            },
        );
        let outputs = self
            .plan
            .run(tvec!(input.into_tensor().into()))
            .context("ONNX inference failed")?;
        decode_labelled_outputs(
            &outputs,
            (
                orig_w as f32 / self.width as f32,
                orig_h as f32 / self.height as f32,
            ),
            (orig_w, orig_h),
            self.confidence_threshold,
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        warm_up_plan(&self.plan, &[3, self.height as usize, self.width as usize])
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
