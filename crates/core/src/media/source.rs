//! Frame sources.
//!
//! The server does not decode containers or codecs: a source yields opaque
//! byte buffers, one per frame tick. A [`MediaSource`] is shared by the
//! whole server and opened once per session, giving each session its own
//! [`FrameSource`] position.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{MediaFormat, Packetizer, RawPacketizer};
use crate::error::{Result, RtspError};

/// Bytes per frame for [`ChunkedFile`] when not configured.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Factory for per-session frame sources.
pub trait MediaSource: Send + Sync {
    /// Encoding advertised in SDP and used for the RTP payload type.
    fn format(&self) -> MediaFormat;

    /// Open a fresh frame source positioned at the first frame.
    fn open(&self) -> Result<Box<dyn FrameSource>>;

    /// Packetizer for one session's stream.
    fn packetizer(&self) -> Box<dyn Packetizer> {
        Box::new(RawPacketizer::with_random_ssrc(self.format().payload_type))
    }
}

/// A lazy, finite or infinite sequence of frames.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;
}

fn open_error(path: &Path, err: std::io::Error) -> RtspError {
    RtspError::MediaSource(format!("{}: {}", path.display(), err))
}

/// A single image sent as every frame, forever.
pub struct StillImage {
    frame: Arc<[u8]>,
    format: MediaFormat,
}

impl StillImage {
    /// Load an image file (JPEG by default).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| open_error(path, e))?;
        tracing::info!(path = %path.display(), bytes = data.len(), "still image loaded");
        Ok(Self::from_bytes(data))
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            frame: data.into(),
            format: MediaFormat::jpeg(),
        }
    }

    pub fn with_format(mut self, format: MediaFormat) -> Self {
        self.format = format;
        self
    }
}

struct RepeatFrame(Arc<[u8]>);

impl FrameSource for RepeatFrame {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(Some(self.0.to_vec()))
    }
}

impl MediaSource for StillImage {
    fn format(&self) -> MediaFormat {
        self.format.clone()
    }

    fn open(&self) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(RepeatFrame(self.frame.clone())))
    }
}

/// A directory of image files, one file per frame in file-name order.
pub struct ImageSequence {
    files: Arc<Vec<PathBuf>>,
    looping: bool,
    format: MediaFormat,
}

impl ImageSequence {
    /// List the regular files in `dir`. Files are read lazily, one per tick.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| open_error(dir, e))? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(RtspError::MediaSource(format!(
                "{}: no image files",
                dir.display()
            )));
        }

        tracing::info!(dir = %dir.display(), frames = files.len(), "image sequence loaded");
        Ok(Self {
            files: Arc::new(files),
            looping: false,
            format: MediaFormat::jpeg(),
        })
    }

    /// Restart from the first image after the last one.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_format(mut self, format: MediaFormat) -> Self {
        self.format = format;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

struct SequenceFrames {
    files: Arc<Vec<PathBuf>>,
    next: usize,
    looping: bool,
}

impl FrameSource for SequenceFrames {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.next >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.next = 0;
        }

        let path = &self.files[self.next];
        self.next += 1;
        let frame = std::fs::read(path).map_err(|e| open_error(path, e))?;
        Ok(Some(frame))
    }
}

impl MediaSource for ImageSequence {
    fn format(&self) -> MediaFormat {
        self.format.clone()
    }

    fn open(&self) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(SequenceFrames {
            files: self.files.clone(),
            next: 0,
            looping: self.looping,
        }))
    }
}

/// A file streamed in fixed-size chunks, one chunk per frame.
///
/// No container parsing happens; each chunk is sent as an opaque
/// payload (H.264 payload type by default).
pub struct ChunkedFile {
    path: PathBuf,
    chunk_size: usize,
    format: MediaFormat,
}

impl ChunkedFile {
    /// Checks that the file exists and is readable.
    pub fn new(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        File::open(&path).map_err(|e| open_error(&path, e))?;
        Ok(Self {
            path,
            chunk_size: chunk_size.max(1),
            format: MediaFormat::h264(),
        })
    }

    pub fn with_format(mut self, format: MediaFormat) -> Self {
        self.format = format;
        self
    }
}

struct ChunkFrames {
    file: File,
    chunk_size: usize,
}

impl FrameSource for ChunkFrames {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        (&mut self.file)
            .take(self.chunk_size as u64)
            .read_to_end(&mut chunk)?;
        Ok((!chunk.is_empty()).then_some(chunk))
    }
}

impl MediaSource for ChunkedFile {
    fn format(&self) -> MediaFormat {
        self.format.clone()
    }

    fn open(&self) -> Result<Box<dyn FrameSource>> {
        let file = File::open(&self.path).map_err(|e| open_error(&self.path, e))?;
        Ok(Box::new(ChunkFrames {
            file,
            chunk_size: self.chunk_size,
        }))
    }
}

/// Frames held in memory. Useful for embedding and tests.
pub struct MemorySource {
    frames: Arc<Vec<Vec<u8>>>,
    looping: bool,
    format: MediaFormat,
}

impl MemorySource {
    pub fn new(format: MediaFormat, frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames: Arc::new(frames),
            looping: false,
            format,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

struct MemoryFrames {
    frames: Arc<Vec<Vec<u8>>>,
    next: usize,
    looping: bool,
}

impl FrameSource for MemoryFrames {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.next >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return Ok(None);
            }
            self.next = 0;
        }
        self.next += 1;
        Ok(Some(self.frames[self.next - 1].clone()))
    }
}

impl MediaSource for MemorySource {
    fn format(&self) -> MediaFormat {
        self.format.clone()
    }

    fn open(&self) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(MemoryFrames {
            frames: self.frames.clone(),
            next: 0,
            looping: self.looping,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut dyn FrameSource, limit: usize) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while out.len() < limit {
            match source.next_frame().unwrap() {
                Some(frame) => out.push(frame),
                None => break,
            }
        }
        out
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rtspd-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn still_image_repeats_forever() {
        let image = StillImage::from_bytes(vec![0xFF, 0xD8]);
        let mut frames = image.open().unwrap();
        assert_eq!(drain(frames.as_mut(), 5).len(), 5);
        assert_eq!(image.format(), MediaFormat::jpeg());
    }

    #[test]
    fn still_image_missing_file() {
        assert!(matches!(
            StillImage::open("/nonexistent/rtspd/image.jpg"),
            Err(RtspError::MediaSource(_))
        ));
    }

    #[test]
    fn memory_source_is_finite_unless_looping() {
        let frames = vec![b"a".to_vec(), b"b".to_vec()];
        let finite = MemorySource::new(MediaFormat::h264(), frames.clone());
        assert_eq!(drain(finite.open().unwrap().as_mut(), 10), frames);

        let looping = MemorySource::new(MediaFormat::h264(), frames).looping(true);
        let got = drain(looping.open().unwrap().as_mut(), 5);
        assert_eq!(got[4], b"a".to_vec());
    }

    #[test]
    fn each_open_starts_from_the_beginning() {
        let source = MemorySource::new(MediaFormat::h264(), vec![b"x".to_vec()]);
        let mut first = source.open().unwrap();
        assert!(first.next_frame().unwrap().is_some());
        assert!(first.next_frame().unwrap().is_none());
        assert!(source.open().unwrap().next_frame().unwrap().is_some());
    }

    #[test]
    fn chunked_file_splits_and_ends() {
        let dir = temp_dir("chunked");
        let path = dir.join("video.h264");
        std::fs::write(&path, vec![7u8; 2500]).unwrap();

        let source = ChunkedFile::new(&path, DEFAULT_CHUNK_SIZE).unwrap();
        let chunks = drain(source.open().unwrap().as_mut(), 10);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1024, 1024, 452]);
        assert_eq!(source.format().payload_type, 96);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn image_sequence_in_name_order() {
        let dir = temp_dir("sequence");
        std::fs::write(dir.join("002.jpg"), b"second").unwrap();
        std::fs::write(dir.join("001.jpg"), b"first").unwrap();

        let sequence = ImageSequence::from_dir(&dir).unwrap();
        assert_eq!(sequence.len(), 2);
        let frames = drain(sequence.open().unwrap().as_mut(), 10);
        assert_eq!(frames, vec![b"first".to_vec(), b"second".to_vec()]);

        let looped = ImageSequence::from_dir(&dir).unwrap().looping(true);
        assert_eq!(drain(looped.open().unwrap().as_mut(), 3)[2], b"first".to_vec());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = temp_dir("empty");
        assert!(ImageSequence::from_dir(&dir).is_err());
        let _ = std::fs::remove_dir_all(dir);
    }
}
