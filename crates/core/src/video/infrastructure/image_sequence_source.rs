use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::{FrameSource, SourceError};

/// Treats a directory of still images as a video, one frame per file in
/// file-name order.
///
/// Useful for pre-extracted frame dumps. Every image must share the
/// dimensions of the first one.
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    width: u32,
    height: u32,
    next_index: usize,
    opened: bool,
}

impl ImageSequenceSource {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            width: 0,
            height: 0,
            next_index: 0,
            opened: false,
        }
    }

    fn load(&self, index: usize) -> Result<Frame, SourceError> {
        let path = &self.files[index];
        let image = image::open(path)
            .map_err(|e| SourceError::Decode(format!("{}: {e}", path.display())))?
            .to_rgb8();
        if image.width() != self.width || image.height() != self.height {
            return Err(SourceError::Decode(format!(
                "{} is {}x{}, expected {}x{}",
                path.display(),
                image.width(),
                image.height(),
                self.width,
                self.height
            )));
        }
        Ok(Frame::from_rgb_image(image, index))
    }
}

impl Default for ImageSequenceSource {
    fn default() -> Self {
        Self::new()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, SourceError> {
        let open_err = |message: String| SourceError::Open {
            path: path.to_path_buf(),
            message,
        };

        let entries = std::fs::read_dir(path).map_err(|e| open_err(e.to_string()))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        files.sort();

        let Some(first) = files.first() else {
            return Err(SourceError::NoVideoStream(path.to_path_buf()));
        };
        let (width, height) =
            image::image_dimensions(first).map_err(|e| open_err(e.to_string()))?;

        self.files = files;
        self.width = width;
        self.height = height;
        self.next_index = 0;
        self.opened = true;

        Ok(VideoMetadata {
            width,
            height,
            fps: 0.0,
            total_frames: self.files.len(),
            codec: "image".to_string(),
            source_path: Some(path.to_path_buf()),
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.opened {
            return Err(SourceError::NotOpened);
        }
        if self.next_index >= self.files.len() {
            return Ok(None);
        }
        let frame = self.load(self.next_index)?;
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn seek(&mut self, index: usize) -> Result<Frame, SourceError> {
        if !self.opened {
            return Err(SourceError::NotOpened);
        }
        if index >= self.files.len() {
            return Err(SourceError::Seek {
                index,
                message: format!("sequence has {} images", self.files.len()),
            });
        }
        let frame = self.load(index)?;
        self.next_index = index + 1;
        Ok(frame)
    }

    fn close(&mut self) {
        self.files.clear();
        self.opened = false;
    }
}
