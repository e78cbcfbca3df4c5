use std::{
    io::{self, Read, Seek, SeekFrom},
    sync::Mutex,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("image ended early reading {len:#x} bytes at {offset:#x}")]
    ShortRead { offset: u64, len: usize },
}

/// Random access reads over a seekable byte source.
///
/// The source sits behind a mutex so the seek and the read following it act
/// as one positional read; callers never observe a file position.
pub struct ImageReader<RS> {
    inner: Mutex<RS>,
    size: u64,
}

impl<RS: Read + Seek> ImageReader<RS> {
    pub fn new(mut source: RS) -> Result<Self, ImageError> {
        let size = source.seek(SeekFrom::End(0))?;
        Ok(ImageReader {
            inner: Mutex::new(source),
            size,
        })
    }

    /// Total size of the image in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Fills `buf` with the bytes starting at `offset`.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ImageError> {
        let mut source = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        source.seek(SeekFrom::Start(offset))?;
        source.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ImageError::ShortRead {
                offset,
                len: buf.len(),
            },
            _ => ImageError::Io(e),
        })
    }

    /// Allocating variant of [`read_at`](Self::read_at).
    pub fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>, ImageError> {
        let mut buf = vec![0; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }
}
