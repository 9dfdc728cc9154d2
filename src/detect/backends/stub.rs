use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::detect::backend::Detector;
use crate::detect::result::BoundingBox;
use crate::detect::writer::ResultWriter;

/// Stub backend for dry runs and tests. Finds nothing, still writes results.
pub struct StubBackend {
    writer: ResultWriter,
}

impl StubBackend {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            writer: ResultWriter::new(output_root, "stub"),
        }
    }
}

impl Detector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn predict(&mut self, image_path: &Path) -> Result<Vec<BoundingBox>> {
        if !image_path.is_file() {
            return Err(anyhow!("no image at {}", image_path.display()));
        }
        Ok(Vec::new())
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
