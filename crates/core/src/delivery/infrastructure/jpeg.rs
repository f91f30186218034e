use crate::delivery::domain::frame_sink::StoreError;
use crate::shared::frame::Frame;

pub const JPEG_QUALITY: u8 = 95;

/// Encodes a frame as a baseline JPEG.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, StoreError> {
    let img = frame.to_rgb_image();
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(&img)
        .map_err(|e| StoreError::Encode(e.to_string()))?;
    Ok(buf)
}

/// `frame_000123.jpg`
pub fn frame_file_name(frame_index: usize) -> String {
    format!("frame_{frame_index:06}.jpg")
}
