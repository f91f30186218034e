/// Axis-aligned face box in pixel coordinates of the frame it was found in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from `[x1, y1, x2, y2]` corners, rounding outward.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let left = x1.min(x2).floor() as i32;
        let top = y1.min(y2).floor() as i32;
        let right = x1.max(x2).ceil() as i32;
        let bottom = y1.max(y2).ceil() as i32;
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() as f64 + other.area() as f64 - inter)
    }

    /// Intersects the box with a `frame_w` x `frame_h` frame.
    ///
    /// Returns `None` when nothing of the box is visible.
    pub fn clamped(&self, frame_w: u32, frame_h: u32) -> Option<BoundingBox> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = (self.x + self.width).min(frame_w as i32);
        let y2 = (self.y + self.height).min(frame_h as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
    }

    /// Square box around the same center, with side `max(w, h) * scale`.
    ///
    /// Landmark regressors expect a square crop with some context around
    /// the face, so detector boxes are widened before cropping.
    pub fn expanded_square(&self, scale: f64) -> BoundingBox {
        let (cx, cy) = self.center();
        let side = (self.width.max(self.height) as f64 * scale).round().max(1.0);
        let half = side / 2.0;
        BoundingBox::new(
            (cx - half).round() as i32,
            (cy - half).round() as i32,
            side as i32,
            side as i32,
        )
    }
}
