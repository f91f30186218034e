use ndarray::ArrayView3;

use crate::shared::region::BoundingBox;

/// A decoded video frame: contiguous RGB bytes in row-major order plus the
/// zero-based position of the frame in its source.
///
/// Pixel format conversion happens at I/O boundaries only; the scoring
/// stages see RGB24 and nothing else.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
}

pub const CHANNELS: usize = 3;

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            index,
        }
    }

    pub fn from_rgb_image(image: image::RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, CHANNELS),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }

    pub fn to_rgb_image(&self) -> image::RgbImage {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
            .expect("Frame data length must match dimensions")
    }

    /// Downscales to `target_width`, preserving aspect ratio.
    ///
    /// Frames already at or below the target width are returned unchanged,
    /// so landmark coordinates stay in the native pixel space.
    pub fn resized_to_width(&self, target_width: u32) -> Frame {
        if target_width == 0 || self.width <= target_width {
            return self.clone();
        }
        let scale = target_width as f64 / self.width as f64;
        let target_height = ((self.height as f64 * scale).round() as u32).max(1);
        let resized = image::imageops::resize(
            &self.to_rgb_image(),
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        );
        Frame::from_rgb_image(resized, self.index)
    }

    /// Copies the pixels inside `bounds` (clamped to the frame) into a new frame.
    ///
    /// Returns `None` when the clamped box is empty.
    pub fn crop(&self, bounds: &BoundingBox) -> Option<Frame> {
        let clamped = bounds.clamped(self.width, self.height)?;
        let x = clamped.x as u32;
        let y = clamped.y as u32;
        let w = clamped.width as u32;
        let h = clamped.height as u32;

        let stride = self.width as usize * CHANNELS;
        let mut pixels = Vec::with_capacity(w as usize * h as usize * CHANNELS);
        for row in y..y + h {
            let start = row as usize * stride + x as usize * CHANNELS;
            pixels.extend_from_slice(&self.data[start..start + w as usize * CHANNELS]);
        }
        Some(Frame::new(pixels, w, h, self.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8, index: usize) -> Frame {
        Frame::new(
            vec![value; width as usize * height as usize * CHANNELS],
            width,
            height,
            index,
        )
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * 3")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 0);
    }

    #[test]
    fn test_as_ndarray_pixel_access() {
        let mut data = vec![0u8; 12];
        data[6] = 255; // row=1, col=0, R
        let frame = Frame::new(data, 2, 2, 0);
        let arr = frame.as_ndarray();
        assert_eq!(arr.shape(), &[2, 2, 3]);
        assert_eq!(arr[[1, 0, 0]], 255);
        assert_eq!(arr[[1, 0, 1]], 0);
    }

    #[test]
    fn test_resize_preserves_aspect_and_index() {
        let frame = solid(2000, 1000, 90, 17);
        let resized = frame.resized_to_width(1000);
        assert_eq!(resized.width(), 1000);
        assert_eq!(resized.height(), 500);
        assert_eq!(resized.index(), 17);
        assert_eq!(resized.data()[0], 90);
    }

    #[test]
    fn test_resize_never_upscales() {
        let frame = solid(640, 480, 10, 0);
        let resized = frame.resized_to_width(1000);
        assert_eq!(resized.width(), 640);
        assert_eq!(resized.height(), 480);
    }

    #[test]
    fn test_crop_copies_region() {
        // 4x2 frame where column 3 of row 1 is bright
        let mut data = vec![0u8; 4 * 2 * 3];
        let offset = (4 + 3) * 3;
        data[offset] = 200;
        let frame = Frame::new(data, 4, 2, 3);

        let crop = frame.crop(&BoundingBox::new(2, 1, 2, 1)).unwrap();
        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 1);
        assert_eq!(crop.index(), 3);
        assert_eq!(crop.data()[3], 200);
    }

    #[test]
    fn test_crop_outside_frame_is_none() {
        let frame = solid(10, 10, 0, 0);
        assert!(frame.crop(&BoundingBox::new(20, 20, 5, 5)).is_none());
    }

    #[test]
    fn test_rgb_image_roundtrip_keeps_pixels() {
        let frame = solid(3, 2, 42, 1);
        let back = Frame::from_rgb_image(frame.to_rgb_image(), 1);
        assert_eq!(back.data(), frame.data());
    }
}
