//! Capture pipeline: sensor callbacks push frames and label lists into
//! per-camera queues; the drain flushes them to numbered PNG/CSV files.

mod drain;
mod frame;
mod labels;
mod preview;
mod queue;

pub use drain::{frame_file_name, save_images, save_labels, DrainReport, FRAME_INDEX_WIDTH};
pub use frame::{CameraDescriptor, CameraFrame, GroundTruthBox, PixelFormat};
pub use labels::{parse_label_csv, read_label_csv, write_label_csv, LABEL_CSV_HEADER};
pub use preview::{preview_queue, FramePreview, LogPreview, NoPreview};
pub use queue::CaptureQueue;
