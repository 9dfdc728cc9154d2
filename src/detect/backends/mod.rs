pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod faster_rcnn;
#[cfg(feature = "backend-tract")]
mod onnx;
#[cfg(feature = "backend-tract")]
pub mod ssd;
#[cfg(feature = "backend-tract")]
pub mod yolov8;

#[cfg(feature = "backend-tract")]
pub use faster_rcnn::FasterRcnnBackend;
#[cfg(feature = "backend-tract")]
pub use ssd::SsdBackend;
pub use stub::StubBackend;
#[cfg(feature = "backend-tract")]
pub use yolov8::Yolov8Backend;
