//! CARLA perception data tooling.
//!
//! Two independent flows:
//!
//! - **Capture**: simulator sensor callbacks push camera frames and
//!   ground-truth label lists into per-camera [`CaptureQueue`]s;
//!   [`save_images`] / [`save_labels`] drain them to
//!   `<output>/<role_name>/<index>.png|csv`.
//! - **Detection**: [`BatchRunner`] walks the saved images of each camera and
//!   feeds them through one [`Detector`] variant chosen at startup.
//!
//! # Module Structure
//!
//! - `capture`: queues, frame/label types, the drain
//! - `detect`: detector trait, variants, result persistence
//! - `runner`: detection batch runner
//! - `sim`: simulator interface and scenario spawning/cleanup
//! - `config`: file/env configuration
//! - `ui`: console progress

pub mod capture;
pub mod config;
pub mod detect;
pub mod runner;
pub mod sim;
pub mod ui;

pub use capture::{
    read_label_csv, save_images, save_labels, CameraDescriptor, CameraFrame, CaptureQueue,
    DrainReport, FramePreview, GroundTruthBox, PixelFormat,
};
pub use config::{DetectorSettings, PerceptionConfig, SimulationSettings};
pub use detect::{build_detector, BoundingBox, Detector, DetectorKind, StubBackend};
pub use runner::{BatchReport, BatchRunner, CameraReport};
