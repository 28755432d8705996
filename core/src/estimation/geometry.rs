use serde::{Deserialize, Serialize};

use crate::interface::BoundingBox;
use crate::prelude::{FollowError, FollowResult};

/// Intrinsics of the forward camera and the assumed subject dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraModel {
    pub image_width_px: f32,
    pub image_height_px: f32,
    /// Horizontal field of view in radians.
    pub horizontal_fov: f32,
    pub subject_height_m: f32,
    pub subject_width_m: f32,
    /// Boxes shorter than this are too far or too small to range reliably.
    pub min_bbox_height_px: f32,
}

/// Range and bearing derived from one bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeBearing {
    pub range: f32,
    pub bearing: f32,
}

/// Pinhole-camera range/bearing estimator. Stateless.
#[derive(Debug, Clone)]
pub struct DistanceBearingModel {
    camera: CameraModel,
    focal_length_px: f32,
}

impl CameraModel {
    pub fn validate(&self) -> FollowResult<()> {
        let camera = self;
        let dims = [
            camera.image_width_px,
            camera.image_height_px,
            camera.subject_height_m,
            camera.subject_width_m,
        ];
        if dims.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(FollowError::InvalidConfig(
                "camera and subject dimensions must be positive".into(),
            ));
        }
        if !(camera.horizontal_fov > 0.0 && camera.horizontal_fov < std::f32::consts::PI) {
            return Err(FollowError::InvalidConfig(
                "horizontal_fov must lie in (0, pi)".into(),
            ));
        }
        if !camera.min_bbox_height_px.is_finite() || camera.min_bbox_height_px < 0.0 {
            return Err(FollowError::InvalidConfig(
                "min_bbox_height_px must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

impl DistanceBearingModel {
    pub fn new(camera: CameraModel) -> FollowResult<Self> {
        camera.validate()?;
        let focal_length_px = (camera.image_width_px / 2.0) / (camera.horizontal_fov / 2.0).tan();
        Ok(Self {
            camera,
            focal_length_px,
        })
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn focal_length_px(&self) -> f32 {
        self.focal_length_px
    }

    /// Estimates range from apparent height (or width when the subject is cut
    /// off by the top or bottom image edge) and bearing from the horizontal
    /// offset of the box centre.
    pub fn estimate(&self, bbox: &BoundingBox) -> FollowResult<RangeBearing> {
        if !bbox.is_finite() || bbox.width <= 0.0 || bbox.height <= 0.0 {
            return Err(FollowError::GeometryUnavailable(format!(
                "degenerate bounding box {:?}",
                bbox
            )));
        }

        let cx = bbox.center_x();
        let cy = bbox.center_y();
        if !(0.0..=self.camera.image_width_px).contains(&cx)
            || !(0.0..=self.camera.image_height_px).contains(&cy)
        {
            return Err(FollowError::GeometryUnavailable(format!(
                "box centre ({:.1}, {:.1}) outside image",
                cx, cy
            )));
        }

        if bbox.height < self.camera.min_bbox_height_px {
            return Err(FollowError::GeometryUnavailable(format!(
                "box height {:.1}px below noise floor {:.1}px",
                bbox.height, self.camera.min_bbox_height_px
            )));
        }

        let truncated = bbox.y <= 0.0 || bbox.bottom() >= self.camera.image_height_px;
        let range = if truncated {
            self.camera.subject_width_m * self.focal_length_px / bbox.width
        } else {
            self.camera.subject_height_m * self.focal_length_px / bbox.height
        };

        let offset = cx - self.camera.image_width_px / 2.0;
        let bearing = (offset / self.focal_length_px).atan();

        Ok(RangeBearing { range, bearing })
    }

    /// Box in which a subject at `range`/`bearing` would appear, vertically
    /// centred. Inverse of [`estimate`](Self::estimate) for untruncated boxes.
    pub fn project(&self, range: f32, bearing: f32) -> BoundingBox {
        let height = self.camera.subject_height_m * self.focal_length_px / range;
        let width = self.camera.subject_width_m * self.focal_length_px / range;
        let cx = self.camera.image_width_px / 2.0 + self.focal_length_px * bearing.tan();
        let cy = self.camera.image_height_px / 2.0;
        BoundingBox::centered(cx, cy, width, height)
    }
}
