use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot open {path}: {message}")]
    Open { path: PathBuf, message: String },
    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("cannot seek to frame {index}: {message}")]
    Seek { index: usize, message: String },
    #[error("frame source not opened")]
    NotOpened,
}

/// Sequential frame decoder with random access by frame index.
///
/// Implementations handle container/codec details; the pipeline only sees
/// [`Frame`]s whose indices start at 0 and increase by one per decoded frame.
pub trait FrameSource: Send {
    /// Opens the source and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, SourceError>;

    /// Decodes the next frame, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Repositions the source and returns the frame at `index`.
    ///
    /// After a seek, `next_frame` continues from `index + 1`.
    fn seek(&mut self, index: usize) -> Result<Frame, SourceError>;

    /// Releases the decoder. Must be idempotent.
    fn close(&mut self);
}

/// An opened [`FrameSource`] that is closed when the handle goes out of
/// scope, whichever way the owning job ends.
pub struct OpenedSource<'a> {
    source: &'a mut dyn FrameSource,
    metadata: VideoMetadata,
}

impl<'a> OpenedSource<'a> {
    pub fn open(source: &'a mut dyn FrameSource, path: &Path) -> Result<Self, SourceError> {
        let metadata = match source.open(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };
        Ok(Self { source, metadata })
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        self.source.next_frame()
    }

    pub fn seek(&mut self, index: usize) -> Result<Frame, SourceError> {
        self.source.seek(index)
    }
}

impl Drop for OpenedSource<'_> {
    fn drop(&mut self) {
        self.source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        fail_open: bool,
        closes: Arc<AtomicUsize>,
        next: usize,
    }

    impl FrameSource for CountingSource {
        fn open(&mut self, path: &Path) -> Result<VideoMetadata, SourceError> {
            if self.fail_open {
                return Err(SourceError::Open {
                    path: path.to_path_buf(),
                    message: "unreadable".into(),
                });
            }
            Ok(VideoMetadata {
                width: 4,
                height: 4,
                fps: 30.0,
                total_frames: 2,
                codec: String::new(),
                source_path: Some(path.to_path_buf()),
            })
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            if self.next >= 2 {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some(Frame::new(vec![0; 48], 4, 4, self.next - 1)))
        }

        fn seek(&mut self, index: usize) -> Result<Frame, SourceError> {
            self.next = index + 1;
            Ok(Frame::new(vec![0; 48], 4, 4, index))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn source(fail_open: bool) -> (CountingSource, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            CountingSource {
                fail_open,
                closes: closes.clone(),
                next: 0,
            },
            closes,
        )
    }

    #[test]
    fn test_opened_source_closes_on_drop() {
        let (mut src, closes) = source(false);
        {
            let mut opened = OpenedSource::open(&mut src, Path::new("/tmp/a.mp4")).unwrap();
            assert_eq!(opened.metadata().total_frames, 2);
            assert_eq!(opened.next_frame().unwrap().unwrap().index(), 0);
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_opened_source_closes_on_early_error_return() {
        fn scan(src: &mut dyn FrameSource) -> Result<(), SourceError> {
            let _opened = OpenedSource::open(src, Path::new("/tmp/a.mp4"))?;
            Err(SourceError::Decode("corrupt packet".into()))
        }
        let (mut src, closes) = source(false);
        assert!(scan(&mut src).is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_open_still_releases() {
        let (mut src, closes) = source(true);
        let result = OpenedSource::open(&mut src, Path::new("/tmp/broken.mp4"));
        assert!(matches!(result, Err(SourceError::Open { .. })));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_seek_then_next_continues_after_target() {
        let (mut src, _) = source(false);
        let mut opened = OpenedSource::open(&mut src, Path::new("/tmp/a.mp4")).unwrap();
        assert_eq!(opened.seek(0).unwrap().index(), 0);
        assert_eq!(opened.next_frame().unwrap().unwrap().index(), 1);
        assert!(opened.next_frame().unwrap().is_none());
    }
}
