//! tract plumbing shared by the ONNX detector variants.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::result::{BoundingBox, COCO_LABELS};

pub(crate) type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Load an ONNX model and pin its first input to `shape`.
pub(crate) fn load_plan(model_path: &Path, shape: &[usize]) -> Result<OnnxPlan> {
    let shape: TVec<usize> = shape.iter().copied().collect();
    let plan = tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")?;
    Ok(plan)
}

/// Run the plan once on a zero tensor of the pinned input shape.
pub(crate) fn warm_up_plan(plan: &OnnxPlan, shape: &[usize]) -> Result<()> {
    let input = Tensor::zero::<f32>(shape).context("failed to build warm-up input")?;
    plan.run(tvec!(input.into())).context("warm-up inference failed")?;
    Ok(())
}

/// Decode an image file and resize it to the model input size.
///
/// Returns the resized image plus the original dimensions for rescaling.
pub(crate) fn load_resized(
    image_path: &Path,
    width: u32,
    height: u32,
) -> Result<(RgbImage, u32, u32)> {
    let img = image::open(image_path)
        .with_context(|| format!("failed to read image {}", image_path.display()))?
        .into_rgb8();
    let (orig_w, orig_h) = img.dimensions();
    let resized = if (orig_w, orig_h) == (width, height) {
        img
    } else {
        image::imageops::resize(&img, width, height, FilterType::Triangle)
    };
    Ok((resized, orig_w, orig_h))
}

/// Build a box from float corner coordinates clamped to the image bounds.
pub(crate) fn clamped_box(
    class_id: u32,
    score: f32,
    corners: [f32; 4],
    image_w: u32,
    image_h: u32,
) -> BoundingBox {
    let [x1, y1, x2, y2] = corners;
    let max_x = image_w.saturating_sub(1) as f32;
    let max_y = image_h.saturating_sub(1) as f32;
    BoundingBox {
        class_id,
        xmin: x1.clamp(0.0, max_x).round() as i32,
        xmax: x2.clamp(0.0, max_x).round() as i32,
        ymin: y1.clamp(0.0, max_y).round() as i32,
        ymax: y2.clamp(0.0, max_y).round() as i32,
        score,
    }
}

/// Decode the `boxes, labels, scores` output triple that both model zoo
/// SSD and Faster R-CNN exports produce. Labels are 1-based COCO-80 ids;
/// box corners are multiplied by `scale` to land in original pixels.
pub(crate) fn decode_labelled_outputs(
    outputs: &TVec<TValue>,
    scale: (f32, f32),
    image_size: (u32, u32),
    threshold: f32,
) -> Result<Vec<BoundingBox>> {
    if outputs.len() < 3 {
        return Err(anyhow!(
            "expected boxes, labels and scores outputs, model produced {}",
            outputs.len()
        ));
    }
    let boxes = outputs[0]
        .to_array_view::<f32>()
        .context("boxes output tensor was not f32")?;
    let labels = outputs[1]
        .to_array_view::<i64>()
        .context("labels output tensor was not i64")?;
    let scores = outputs[2]
        .to_array_view::<f32>()
        .context("scores output tensor was not f32")?;

    let boxes: Vec<f32> = boxes.iter().copied().collect();
    if boxes.len() != scores.len() * 4 || labels.len() != scores.len() {
        return Err(anyhow!(
            "inconsistent detection outputs: {} box values, {} labels, {} scores",
            boxes.len(),
            labels.len(),
            scores.len()
        ));
    }

    let (sx, sy) = scale;
    let (image_w, image_h) = image_size;
    let mut out = Vec::new();
    for ((corners, &label), &score) in boxes.chunks_exact(4).zip(labels.iter()).zip(scores.iter()) {
        if score < threshold || label < 1 || label as usize > COCO_LABELS.len() {
            continue;
        }
        out.push(clamped_box(
            (label - 1) as u32,
            score,
            [
                corners[0] * sx,
                corners[1] * sy,
                corners[2] * sx,
                corners[3] * sy,
            ],
            image_w,
            image_h,
        ));
    }
    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(out)
}
