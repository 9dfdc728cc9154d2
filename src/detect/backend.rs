use std::path::Path;

use anyhow::Result;

use crate::detect::result::BoundingBox;

/// Detector backend trait.
///
/// Every variant exposes the same two operations: run inference on an image
/// file, and persist the boxes it found for that image. The batch runner only
/// ever talks to this trait, so variants are interchangeable at startup.
pub trait Detector {
    /// Backend identifier, also used as the output directory name.
    fn name(&self) -> &'static str;

    /// Run detection on the image at `image_path`.
    ///
    /// Returned boxes are already filtered by the backend's confidence
    /// threshold and expressed in the original image's pixel space.
    fn predict(&mut self, image_path: &Path) -> Result<Vec<BoundingBox>>;

    /// Persist the detections for one frame of one camera.
    fn save_result(
        &mut self,
        image_path: &Path,
        bboxes: &[BoundingBox],
        map: &str,
        camera: &str,
        frame_index: &str,
    ) -> Result<()>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn predict(&mut self, image_path: &Path) -> Result<Vec<BoundingBox>> {
        (**self).predict(image_path)
    }

    fn save_result(
        &mut self,
        image_path: &Path,
        bboxes: &[BoundingBox],
        map: &str,
        camera: &str,
        frame_index: &str,
    ) -> Result<()> {
        (**self).save_result(image_path, bboxes, map, camera, frame_index)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
