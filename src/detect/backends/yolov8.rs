use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use super::onnx::{clamped_box, load_plan, load_resized, warm_up_plan, OnnxPlan};
use crate::detect::backend::Detector;
use crate::detect::result::{non_max_suppression, BoundingBox};
use crate::detect::writer::ResultWriter;

const IOU_THRESHOLD: f32 = 0.45;

/// YOLOv8n exported by ultralytics (`yolo export format=onnx`).
///
/// Output is `[1, 4 + classes, anchors]`: centre x/y, width, height, then one
/// score per class. NMS runs here since the export does not include it.
pub struct Yolov8Backend {
    plan: OnnxPlan,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    writer: ResultWriter,
}

impl Yolov8Backend {
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
            writer: ResultWriter::new(output_root, "yolov8n"),
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

impl Detector for Yolov8Backend {
    fn name(&self) -> &'static str {
        "yolov8n"
    }

    fn predict(&mut self, image_path: &Path) -> Result<Vec<BoundingBox>> {
        let (resized, orig_w, orig_h) = load_resized(image_path, self.width, self.height)?;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        let outputs = self
            .plan
            .run(tvec!(input.into_tensor().into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let output = output
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("YOLOv8 output must be [1, 4 + classes, anchors]")?;
        decode_output(
            output,
            (
                orig_w as f32 / self.width as f32,
                orig_h as f32 / self.height as f32,
            ),
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

/// Turn a raw `[1, 4 + classes, anchors]` output into boxes in original image
/// pixels. `scale` maps model input pixels to original pixels.
pub(crate) fn decode_output(
    output: tract_ndarray::ArrayView3<f32>,
    scale: (f32, f32),
    image_size: (u32, u32),
    threshold: f32,
) -> Result<Vec<BoundingBox>> {
    let (batch, rows, anchors) = output.dim();
    if batch != 1 || rows <= 4 {
        return Err(anyhow!("unexpected YOLOv8 output shape {:?}", output.shape()));
    }
    let (sx, sy) = scale;
    let (image_w, image_h) = image_size;

    let mut boxes = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (4..rows)
            .map(|row| (row - 4, output[[0, row, anchor]]))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if score < threshold {
            continue;
        }
        let cx = output[[0, 0, anchor]];
        let cy = output[[0, 1, anchor]];
        let w = output[[0, 2, anchor]];
        let h = output[[0, 3, anchor]];
        boxes.push(clamped_box(
            class_id as u32,
            score,
            [
                (cx - w / 2.0) * sx,
                (cy - h / 2.0) * sy,
                (cx + w / 2.0) * sx,
                (cy + h / 2.0) * sy,
            ],
            image_w,
            image_h,
        ));
    }
    non_max_suppression(&mut boxes, IOU_THRESHOLD);
    Ok(boxes)
}
