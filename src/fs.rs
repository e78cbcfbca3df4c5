//! Filesystem view over a partition: path lookup and file handles.

use std::io::{self, Read, Seek, SeekFrom};

use thiserror::Error;

use crate::{
    fst::{Fst, FstError, FstNode},
    partition::{Partition, PartitionError},
};

#[derive(Error, Debug)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("partition error: {0}")]
    Partition(#[from] PartitionError),
}

/// What a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    File,
    Directory,
}

/// Result of [`Filesystem::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: StatKind,
    /// Byte size, files only.
    pub size: Option<u32>,
}

/// Path based access to the files of one partition.
///
/// The tree is parsed once at construction and never changes, so it can be
/// shared freely between readers.
pub struct Filesystem<'p, RS> {
    part: &'p Partition<'p, RS>,
    fst: Fst,
}

impl<'p, RS: Read + Seek> Filesystem<'p, RS> {
    /// Parses the partition's file system table.
    pub fn new(part: &'p Partition<'p, RS>) -> Result<Self, FstError> {
        Ok(Filesystem {
            part,
            fst: Fst::read(part)?,
        })
    }

    /// The root directory of the parsed tree.
    pub fn root(&self) -> &FstNode {
        self.fst.root()
    }

    fn resolve(&self, path: &str) -> Result<&FstNode, FsError> {
        resolve(self.fst.root(), path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    pub fn is_file(&self, path: &str) -> bool {
        matches!(self.resolve(path), Ok(FstNode::File { .. }))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.resolve(path), Ok(FstNode::Directory { .. }))
    }

    /// Names of the direct children of a directory, in table order.
    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        match self.resolve(path)? {
            FstNode::Directory { entries } => {
                Ok(entries.iter().map(|(name, _)| name.clone()).collect())
            }
            FstNode::File { .. } => Err(FsError::NotADirectory(path.to_owned())),
        }
    }

    /// Size in bytes of the file at `path`.
    pub fn size_of(&self, path: &str) -> Result<u32, FsError> {
        match self.resolve(path)? {
            FstNode::File { size, .. } => Ok(*size),
            FstNode::Directory { .. } => Err(FsError::NotAFile(path.to_owned())),
        }
    }

    pub fn stat(&self, path: &str) -> Result<Stat, FsError> {
        Ok(match self.resolve(path)? {
            FstNode::File { size, .. } => Stat {
                kind: StatKind::File,
                size: Some(*size),
            },
            FstNode::Directory { .. } => Stat {
                kind: StatKind::Directory,
                size: None,
            },
        })
    }

    /// Opens the file at `path` for reading.
    pub fn open(&self, path: &str) -> Result<FileHandle<'p, RS>, FsError> {
        match self.resolve(path)? {
            FstNode::File { offset, size } => Ok(FileHandle {
                part: self.part,
                offset: *offset,
                size: *size,
                pos: 0,
            }),
            FstNode::Directory { .. } => Err(FsError::IsADirectory(path.to_owned())),
        }
    }
}

/// Walks `path` down from `root`. Empty components are dropped, so leading,
/// trailing and doubled slashes all resolve like the plain path.
fn resolve<'t>(root: &'t FstNode, path: &str) -> Result<&'t FstNode, FsError> {
    let mut node = root;
    for comp in path.split('/').filter(|comp| !comp.is_empty()) {
        node = match node {
            FstNode::Directory { .. } => node
                .child(comp)
                .ok_or_else(|| FsError::NotFound(path.to_owned()))?,
            FstNode::File { .. } => return Err(FsError::NotADirectory(path.to_owned())),
        };
    }
    Ok(node)
}

/// Read cursor over a single file.
///
/// Holds no OS resources; dropping the handle is all the cleanup there is.
/// Reads go through the owning partition, so a handle never outlives it.
pub struct FileHandle<'p, RS> {
    part: &'p Partition<'p, RS>,
    offset: u64,
    size: u32,
    pos: u64,
}

impl<RS: Read + Seek> FileHandle<'_, RS> {
    /// Size of the file in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Current cursor position.
    pub fn tell(&self) -> u64 {
        self.pos
    }
}

impl<RS: Read + Seek> Read for FileHandle<'_, RS> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let size = u64::from(self.size);
        if self.pos >= size {
            return Ok(0);
        }
        let take = (size - self.pos).min(buf.len() as u64) as usize;
        self.part
            .read(self.offset + self.pos, &mut buf[..take])
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.pos += take as u64;
        Ok(take)
    }
}

impl<RS: Read + Seek> Seek for FileHandle<'_, RS> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(off) => off as i64,
            SeekFrom::Current(off) => self.pos as i64 + off,
            SeekFrom::End(off) => i64::from(self.size) + off,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        // positions past the end are fine, reads there return nothing
        self.pos = new_pos as u64;
        Ok(self.pos)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}
