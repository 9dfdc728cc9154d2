//! Shared persistence for detector results.
//!
//! Layout: `<root>/<map>/<detector>/<camera>/<frame_index>.{png,csv}` where the
//! PNG is the input image with every box outlined and the CSV lists the boxes.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::result::BoundingBox;

pub const RESULT_CSV_HEADER: &str = "class_id,label,score,xmin,xmax,ymin,ymax";

/// Box outline colours, picked by class id.
const PALETTE: [[u8; 3]; 6] = [
    [255, 56, 56],
    [56, 255, 56],
    [56, 56, 255],
    [255, 178, 29],
    [207, 210, 49],
    [146, 204, 23],
];

#[derive(Clone, Debug)]
pub struct ResultWriter {
    root: PathBuf,
    detector: &'static str,
}

impl ResultWriter {
    pub fn new(root: impl Into<PathBuf>, detector: &'static str) -> Self {
        Self {
            root: root.into(),
            detector,
        }
    }

    pub fn camera_dir(&self, map: &str, camera: &str) -> PathBuf {
        self.root.join(map).join(self.detector).join(camera)
    }

    pub fn write(
        &self,
        image_path: &Path,
        bboxes: &[BoundingBox],
        map: &str,
        camera: &str,
        frame_index: &str,
    ) -> Result<()> {
        // Decode first so an unreadable input leaves nothing behind.
        let mut img = image::open(image_path)
            .with_context(|| format!("failed to read image {}", image_path.display()))?
            .into_rgb8();

        let dir = self.camera_dir(map, camera);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create result dir {}", dir.display()))?;

        let csv_path = dir.join(format!("{frame_index}.csv"));
        write_result_csv(&csv_path, bboxes)?;

        for bbox in bboxes {
            let rect = Rect::at(bbox.xmin, bbox.ymin)
                .of_size(bbox.width().max(1) as u32, bbox.height().max(1) as u32);
            let color = PALETTE[bbox.class_id as usize % PALETTE.len()];
            draw_hollow_rect_mut(&mut img, rect, Rgb(color));
        }
        let png_path = dir.join(format!("{frame_index}.png"));
        img.save(&png_path)
            .with_context(|| format!("failed to write {}", png_path.display()))?;

        log::debug!(
            "{}: wrote {} boxes for {}/{} frame {}",
            self.detector,
            bboxes.len(),
            map,
            camera,
            frame_index
        );
        Ok(())
    }
}

fn write_result_csv(path: &Path, bboxes: &[BoundingBox]) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{RESULT_CSV_HEADER}")?;
    for b in bboxes {
        writeln!(
            out,
            "{},{},{:.4},{},{},{},{}",
            b.class_id,
            b.label(),
            b.score,
            b.xmin,
            b.xmax,
            b.ymin,
            b.ymax
        )?;
    }
    out.flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
