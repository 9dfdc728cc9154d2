//! Detection batch runner.
//!
//! For each configured camera, every image under
//! `<input_base_dir>/<map>/original/<camera>` is passed through the active
//! detector and its result saved. Failures are advisory: they are logged and
//! counted, and the run moves on to the next image or camera.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::PerceptionConfig;
use crate::detect::Detector;

pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Per-image progress notification.
#[derive(Debug)]
pub enum ImageEvent<'a> {
    /// Directory listed; `total` images will be attempted.
    Listed { total: usize },
    Processed { path: &'a Path, boxes: usize },
    Failed { path: &'a Path, error: &'a anyhow::Error },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CameraReport {
    pub camera: String,
    pub input_dir: PathBuf,
    /// Input directory absent or unreadable; nothing was attempted.
    pub missing: bool,
    pub processed: usize,
    pub failed: usize,
    /// Directory entries that were not image files.
    pub skipped: usize,
    pub detections: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    pub detector: String,
    pub map: String,
    pub cameras: Vec<CameraReport>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.cameras.iter().map(|c| c.processed).sum()
    }

    pub fn failed(&self) -> usize {
        self.cameras.iter().map(|c| c.failed).sum()
    }

    pub fn detections(&self) -> usize {
        self.cameras.iter().map(|c| c.detections).sum()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

pub struct BatchRunner {
    input_base_dir: PathBuf,
    map: String,
    cameras: Vec<String>,
}

impl BatchRunner {
    pub fn new(config: &PerceptionConfig) -> Self {
        Self {
            input_base_dir: config.input_base_dir.clone(),
            map: config.map.clone(),
            cameras: config.cameras.clone(),
        }
    }

    pub fn cameras(&self) -> &[String] {
        &self.cameras
    }

    pub fn camera_input_dir(&self, camera: &str) -> PathBuf {
        self.input_base_dir
            .join(&self.map)
            .join("original")
            .join(camera)
    }

    /// Process every configured camera in order.
    pub fn run(&self, detector: &mut dyn Detector) -> BatchReport {
        let cameras = self
            .cameras
            .iter()
            .map(|camera| self.run_camera(detector, camera, &mut |_| {}))
            .collect();
        log::info!("all images processed");
        BatchReport {
            detector: detector.name().to_string(),
            map: self.map.clone(),
            cameras,
        }
    }

    pub fn run_camera(
        &self,
        detector: &mut dyn Detector,
        camera: &str,
        on_event: &mut dyn FnMut(ImageEvent<'_>),
    ) -> CameraReport {
        let input_dir = self.camera_input_dir(camera);
        let mut report = CameraReport {
            camera: camera.to_string(),
            input_dir: input_dir.clone(),
            ..CameraReport::default()
        };

        if !input_dir.is_dir() {
            log::warn!("input directory does not exist: {}", input_dir.display());
            report.missing = true;
            return report;
        }
        let (images, skipped) = match list_images(&input_dir) {
            Ok(listing) => listing,
            Err(err) => {
                log::warn!("{:#}", err);
                report.missing = true;
                return report;
            }
        };
        report.skipped = skipped;
        on_event(ImageEvent::Listed {
            total: images.len(),
        });

        for image_path in &images {
            let index = frame_index(image_path);
            let outcome = detector.predict(image_path).and_then(|bboxes| {
                detector.save_result(image_path, &bboxes, &self.map, camera, &index)?;
                Ok(bboxes.len())
            });
            match outcome {
                Ok(boxes) => {
                    log::debug!("processed {} for camera {}", image_path.display(), camera);
                    report.processed += 1;
                    report.detections += boxes;
                    on_event(ImageEvent::Processed {
                        path: image_path,
                        boxes,
                    });
                }
                Err(err) => {
                    log::warn!("could not process image {}: {:#}", image_path.display(), err);
                    report.failed += 1;
                    on_event(ImageEvent::Failed {
                        path: image_path,
                        error: &err,
                    });
                }
            }
        }
        report
    }
}

/// Image files in `dir`, sorted by file name, plus the count of other entries.
pub fn list_images(dir: &Path) -> Result<(Vec<PathBuf>, usize)> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    let mut images = Vec::new();
    let mut skipped = 0;
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(err) => {
                log::warn!("could not read entry in {}: {}", dir.display(), err);
                skipped += 1;
                continue;
            }
        };
        if path.is_file() && has_image_extension(&path) {
            images.push(path);
        } else {
            log::debug!("skipping {}", path.display());
            skipped += 1;
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok((images, skipped))
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Frame index is the file name up to its first dot (`000012.png` -> `000012`).
pub fn frame_index(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}
