use serde::{Deserialize, Serialize};

/// COCO class names indexed by `BoundingBox::class_id`.
pub const COCO_LABELS: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Label for a class id, or `"unknown"` when out of range.
pub fn class_name(class_id: u32) -> &'static str {
    COCO_LABELS
        .get(class_id as usize)
        .copied()
        .unwrap_or("unknown")
}

/// One detected object in original image pixel space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub class_id: u32,
    pub xmin: i32,
    pub xmax: i32,
    pub ymin: i32,
    pub ymax: i32,
    pub score: f32,
}

impl BoundingBox {
    pub fn label(&self) -> &'static str {
        class_name(self.class_id)
    }

    pub fn width(&self) -> i32 {
        (self.xmax - self.xmin).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.ymax - self.ymin).max(0)
    }

    fn area(&self) -> f32 {
        self.width() as f32 * self.height() as f32
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.xmax.min(other.xmax) - self.xmin.max(other.xmin)).max(0) as f32;
        let iy = (self.ymax.min(other.ymax) - self.ymin.max(other.ymin)).max(0) as f32;
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Class-wise non-maximum suppression. Keeps the highest scoring box of every
/// overlapping same-class cluster; output is sorted by descending score.
pub fn non_max_suppression(boxes: &mut Vec<BoundingBox>, iou_threshold: f32) {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept = 0;
    for index in 0..boxes.len() {
        let suppressed = (0..kept).any(|prev| {
            boxes[prev].class_id == boxes[index].class_id
                && boxes[prev].iou(&boxes[index]) > iou_threshold
        });
        if !suppressed {
            boxes.swap(kept, index);
            kept += 1;
        }
    }
    boxes.truncate(kept);
}
