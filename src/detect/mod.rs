mod backend;
pub mod backends;
mod registry;
mod result;
mod writer;

pub use backend::Detector;
pub use backends::StubBackend;
pub use registry::{build_detector, DetectorKind};
pub use result::{class_name, non_max_suppression, BoundingBox, COCO_LABELS};
pub use writer::{ResultWriter, RESULT_CSV_HEADER};
