//! carla-detect - run object detection over saved CARLA camera frames.
//!
//! Reads `<input>/<map>/original/<camera>/*.png`, runs the selected detector
//! on every image and writes annotated frames plus per-frame CSVs to
//! `<output>/<map>/<detector>/<camera>/`. A JSON run summary lands next to
//! them as `report.json`.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use carla_perception::config::PerceptionConfig;
use carla_perception::runner::{BatchReport, BatchRunner, ImageEvent};
use carla_perception::ui::Ui;
use carla_perception::{build_detector, DetectorKind};

#[derive(Parser, Debug)]
#[command(name = "carla-detect", author, version, about)]
struct Args {
    /// TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Detector variant (yolov8n|ssd|faster_rcnn|stub)
    #[arg(long, value_name = "KIND")]
    detector: Option<DetectorKind>,

    /// Map name (sub-directory of the input base dir)
    #[arg(long)]
    map: Option<String>,

    /// Camera role name; repeat for several cameras
    #[arg(long = "camera", value_name = "ROLE")]
    cameras: Vec<String>,

    /// Base directory holding `<map>/original/<camera>` folders
    #[arg(long, value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Root for detector results (defaults to the input dir)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Confidence threshold in [0, 1]
    #[arg(long)]
    threshold: Option<f32>,

    /// ONNX model file
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn apply(self, cfg: &mut PerceptionConfig) {
        if let Some(dir) = self.input_dir {
            if cfg.output_dir == cfg.input_base_dir {
                cfg.output_dir = dir.clone();
            }
            cfg.input_base_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            cfg.output_dir = dir;
        }
        if let Some(map) = self.map {
            cfg.map = map;
        }
        if !self.cameras.is_empty() {
            cfg.cameras = self.cameras;
        }
        if let Some(kind) = self.detector {
            cfg.detector.kind = kind;
        }
        if let Some(threshold) = self.threshold {
            cfg.detector.confidence_threshold = threshold;
        }
        if let Some(model) = self.model {
            cfg.detector.model_path = Some(model);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let mut cfg = PerceptionConfig::load(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;
    log::info!(
        "map={} cameras={:?} detector={} threshold={}",
        cfg.map,
        cfg.cameras,
        cfg.detector.kind,
        cfg.detector.confidence_threshold
    );

    let mut detector = {
        let _stage = ui.stage("Load detector");
        build_detector(&cfg.detector, &cfg.output_dir)?
    };
    detector.warm_up()?;

    let runner = BatchRunner::new(&cfg);
    let mut report = BatchReport {
        detector: detector.name().to_string(),
        map: cfg.map.clone(),
        cameras: Vec::new(),
    };
    for camera in runner.cameras() {
        let mut stage = ui.stage(&format!("Camera {camera}"));
        let camera_report = runner.run_camera(detector.as_mut(), camera, &mut |event| match event {
            ImageEvent::Listed { total } => stage.set_total(total),
            ImageEvent::Processed { .. } => stage.advance(),
            ImageEvent::Failed { path, .. } => stage.fail(&path.display().to_string()),
        });
        report.cameras.push(camera_report);
    }

    let report_path = cfg
        .output_dir
        .join(&cfg.map)
        .join(detector.name())
        .join("report.json");
    report.write_json(&report_path)?;
    log::info!(
        "all images processed: {} ok, {} failed, {} detections (summary: {})",
        report.processed(),
        report.failed(),
        report.detections(),
        report_path.display()
    );
    Ok(())
}
