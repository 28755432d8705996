use serde::{Deserialize, Serialize};

/// Pixel bounding box, top-left origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box of the given size centred on `(cx, cy)`.
    pub fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Single person detection emitted by the vision pipeline for one frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub timestamp: f64,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, timestamp: f64) -> Self {
        Self {
            bbox,
            confidence,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_box_reports_its_center() {
        let bbox = BoundingBox::centered(320.0, 240.0, 40.0, 100.0);
        assert_eq!(bbox.center_x(), 320.0);
        assert_eq!(bbox.center_y(), 240.0);
        assert_eq!(bbox.bottom(), 290.0);
    }
}
