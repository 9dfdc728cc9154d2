use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::backend::Detector;
use super::backends::StubBackend;
use crate::config::DetectorSettings;

/// Detector variant chosen at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    #[default]
    Yolov8n,
    Ssd,
    FasterRcnn,
    Stub,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 4] = [
        DetectorKind::Yolov8n,
        DetectorKind::Ssd,
        DetectorKind::FasterRcnn,
        DetectorKind::Stub,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Yolov8n => "yolov8n",
            DetectorKind::Ssd => "ssd",
            DetectorKind::FasterRcnn => "faster_rcnn",
            DetectorKind::Stub => "stub",
        }
    }

    /// Model input `(width, height)` used when the config leaves it unset.
    pub fn default_input_size(&self) -> Option<(u32, u32)> {
        match self {
            DetectorKind::Yolov8n => Some((640, 640)),
            DetectorKind::Ssd => Some((1200, 1200)),
            DetectorKind::FasterRcnn => Some((1088, 800)),
            DetectorKind::Stub => None,
        }
    }

    /// Model file looked up under `models/` when no path is configured.
    pub fn default_model_file(&self) -> Option<&'static str> {
        match self {
            DetectorKind::Yolov8n => Some("yolov8n.onnx"),
            DetectorKind::Ssd => Some("ssd-10.onnx"),
            DetectorKind::FasterRcnn => Some("FasterRCNN-10.onnx"),
            DetectorKind::Stub => None,
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "yolov8n" | "yolov8" | "yolo" => Ok(DetectorKind::Yolov8n),
            "ssd" => Ok(DetectorKind::Ssd),
            "faster_rcnn" | "fasterrcnn" | "fast_rcnn" | "fastrcnn" => {
                Ok(DetectorKind::FasterRcnn)
            }
            "stub" => Ok(DetectorKind::Stub),
            other => Err(anyhow!(
                "unknown detector '{}' (expected one of: yolov8n, ssd, faster_rcnn, stub)",
                other
            )),
        }
    }
}

/// Build the configured detector. Results are written under `output_root`.
pub fn build_detector(
    settings: &DetectorSettings,
    output_root: &Path,
) -> Result<Box<dyn Detector>> {
    match settings.kind {
        DetectorKind::Stub => Ok(Box::new(StubBackend::new(output_root))),
        kind => build_onnx_detector(kind, settings, output_root),
    }
}

#[cfg(feature = "backend-tract")]
fn build_onnx_detector(
    kind: DetectorKind,
    settings: &DetectorSettings,
    output_root: &Path,
) -> Result<Box<dyn Detector>> {
    use super::backends::{FasterRcnnBackend, SsdBackend, Yolov8Backend};

    let model_path = settings.resolved_model_path();
    let (width, height) = settings.resolved_input_size();
    log::info!(
        "loading {} model from {} ({}x{})",
        kind,
        model_path.display(),
        width,
        height
    );
    let threshold = settings.confidence_threshold;
    let detector: Box<dyn Detector> = match kind {
        DetectorKind::Yolov8n => Box::new(
            Yolov8Backend::new(&model_path, width, height, output_root)?.with_threshold(threshold),
        ),
        DetectorKind::Ssd => Box::new(
            SsdBackend::new(&model_path, width, height, output_root)?.with_threshold(threshold),
        ),
        DetectorKind::FasterRcnn => Box::new(
            FasterRcnnBackend::new(&model_path, width, height, output_root)?
                .with_threshold(threshold),
        ),
        DetectorKind::Stub => Box::new(StubBackend::new(output_root)),
    };
    Ok(detector)
}

#[cfg(not(feature = "backend-tract"))]
fn build_onnx_detector(
    kind: DetectorKind,
    _settings: &DetectorSettings,
    _output_root: &Path,
) -> Result<Box<dyn Detector>> {
    Err(anyhow!(
        "detector '{}' requires the backend-tract feature",
        kind
    ))
}
