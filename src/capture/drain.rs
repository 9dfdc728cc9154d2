//! Flush per-camera capture queues to disk.
//!
//! Each call walks the cameras in order, creates `<output_dir>/<role_name>/`
//! and pops its queue until empty, numbering items from zero as they come
//! out. Numbering is per call and unrelated to simulation ticks. A failed
//! write aborts the call; items already popped are not put back.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use super::frame::{CameraDescriptor, CameraFrame, GroundTruthBox};
use super::labels::write_label_csv;
use super::preview::FramePreview;
use super::queue::CaptureQueue;

/// Digits in a drained file name (`000042.png`).
pub const FRAME_INDEX_WIDTH: usize = 6;

pub fn frame_file_name(index: usize, extension: &str) -> String {
    format!("{index:0width$}.{extension}", width = FRAME_INDEX_WIDTH)
}

/// Outcome of draining one camera's queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub camera: String,
    pub dir: PathBuf,
    pub written: usize,
}

/// Drain every frame queue to `<output_dir>/<role_name>/<index>.png`.
pub fn save_images(
    image_queues: &[CaptureQueue<CameraFrame>],
    cameras: &[CameraDescriptor],
    output_dir: &Path,
    preview: &mut dyn FramePreview,
) -> Result<Vec<DrainReport>> {
    check_pairing(image_queues.len(), cameras.len())?;

    let mut reports = Vec::with_capacity(cameras.len());
    for (queue, camera) in image_queues.iter().zip(cameras) {
        let camera_name = camera.role_name.as_str();
        log::info!("saving {} images from {}...", queue.len()?, camera_name);
        let save_dir = camera_dir(output_dir, camera_name)?;

        let mut num_frame = 0;
        while let Some(frame) = queue.pop()? {
            let image_path = save_dir.join(frame_file_name(num_frame, "png"));
            frame
                .to_rgb_image()?
                .save(&image_path)
                .with_context(|| format!("failed to write {}", image_path.display()))?;
            if let Err(err) = preview.show(camera_name, &frame) {
                log::debug!("{}: preview failed: {:#}", camera_name, err);
            }
            num_frame += 1;
        }
        reports.push(DrainReport {
            camera: camera_name.to_string(),
            dir: save_dir,
            written: num_frame,
        });
    }
    Ok(reports)
}

/// Drain every label queue to `<output_dir>/<role_name>/<index>.csv`.
pub fn save_labels(
    label_queues: &[CaptureQueue<Vec<GroundTruthBox>>],
    cameras: &[CameraDescriptor],
    output_dir: &Path,
) -> Result<Vec<DrainReport>> {
    check_pairing(label_queues.len(), cameras.len())?;

    let mut reports = Vec::with_capacity(cameras.len());
    for (queue, camera) in label_queues.iter().zip(cameras) {
        let camera_name = camera.role_name.as_str();
        log::info!("saving labels from {}...", camera_name);
        let save_dir = camera_dir(output_dir, camera_name)?;

        let mut num_frame = 0;
        while let Some(labels) = queue.pop()? {
            let label_path = save_dir.join(frame_file_name(num_frame, "csv"));
            write_label_csv(&label_path, &labels)?;
            num_frame += 1;
        }
        reports.push(DrainReport {
            camera: camera_name.to_string(),
            dir: save_dir,
            written: num_frame,
        });
    }
    Ok(reports)
}

fn check_pairing(queues: usize, cameras: usize) -> Result<()> {
    if queues != cameras {
        return Err(anyhow!("{} queues supplied for {} cameras", queues, cameras));
    }
    Ok(())
}

fn camera_dir(output_dir: &Path, camera_name: &str) -> Result<PathBuf> {
    let dir = output_dir.join(camera_name);
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}
