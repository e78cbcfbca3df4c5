//! File system table parsing.
//!
//! The FST is a flat array of 12 byte descriptors encoding the directory
//! tree in preorder, followed by a packed table of NUL terminated names.
//! The root descriptor's size field holds the total descriptor count.

use std::io::{Read, Seek};

use encoding_rs::WINDOWS_1252;
use thiserror::Error;

use crate::partition::{Partition, PartitionError};

/// Partition logical offset of the word locating the FST.
const FST_OFFSET_POS: u64 = 0x424;
/// Longest permitted name, excluding the terminator.
const MAX_NAME_LEN: usize = 255;
/// Descriptor counts beyond this are considered corrupt.
const MAX_DESCRIPTORS: u32 = 0x10_0000;
/// Nesting bound for the recursive parse; real tables stay very flat.
const MAX_DEPTH: u32 = 64;

#[derive(Error, Debug)]
pub enum FstError {
    #[error("descriptor table declares {0} entries")]
    BadDescriptorCount(u32),
    #[error("descriptor {0} is out of range, the table has {1} entries")]
    DescriptorOutOfRange(u32, u32),
    #[error("subtree of descriptor {0} ends at {1}, outside the table")]
    BadSubtreeEnd(u32, u32),
    #[error("directories nest deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("name of descriptor {0} is missing or not terminated")]
    UnterminatedName(u32),
    #[error("two entries named {0:?} in one directory")]
    DuplicateName(String),
    #[error("file data at {offset:#x}+{size:#x} is outside the partition")]
    FileOutOfBounds { offset: u64, size: u32 },
    #[error("the parse consumed {0} descriptors, the table declares {1}")]
    CountMismatch(u32, u32),
    #[error("partition error: {0}")]
    Partition(#[from] PartitionError),
}

/// One node of the parsed file tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FstNode {
    File {
        /// Logical partition offset of the file data.
        offset: u64,
        /// Length in bytes.
        size: u32,
    },
    Directory {
        /// Children in table order, names unique within the directory.
        entries: Vec<(String, FstNode)>,
    },
}

impl FstNode {
    pub fn is_file(&self) -> bool {
        matches!(self, FstNode::File { .. })
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FstNode::Directory { .. })
    }

    /// Looks up a direct child by name. Files have no children.
    pub fn child(&self, name: &str) -> Option<&FstNode> {
        match self {
            FstNode::Directory { entries } => entries
                .iter()
                .find(|(child, _)| child == name)
                .map(|(_, node)| node),
            FstNode::File { .. } => None,
        }
    }
}

/// The parsed file system table of one partition.
#[derive(Debug)]
pub struct Fst {
    root: FstNode,
}

impl Fst {
    /// Reads and parses the FST of the given partition.
    pub fn read<RS: Read + Seek>(part: &Partition<'_, RS>) -> Result<Fst, FstError> {
        let mut word = [0u8; 4];
        part.read(FST_OFFSET_POS, &mut word)?;
        let fst_offset = u64::from(u32::from_be_bytes(word)) * 4;

        let mut root = [0u8; 12];
        part.read(fst_offset, &mut root)?;
        let count = be_u32(&root, 8);
        if count == 0 || count > MAX_DESCRIPTORS {
            return Err(FstError::BadDescriptorCount(count));
        }
        let descriptors = part.read_vec(fst_offset, 12 * count as usize)?;

        // the widest name referenced bounds how much of the string table
        // can matter
        let mut name_span = 0u64;
        for idx in 1..count {
            let name_off = be_u32(&descriptors, idx as usize * 12) & 0x00FF_FFFF;
            name_span = name_span.max(u64::from(name_off) + MAX_NAME_LEN as u64 + 1);
        }
        let strings_offset = fst_offset + 12 * u64::from(count);
        let strings_len = name_span.min(part.logical_size().saturating_sub(strings_offset));
        let strings = part.read_vec(strings_offset, strings_len as usize)?;

        let root = parse(&descriptors, count, &strings, part.logical_size())?;
        Ok(Fst { root })
    }

    /// The root directory.
    pub fn root(&self) -> &FstNode {
        &self.root
    }
}

fn be_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Builds the tree out of the descriptor block and the string table.
///
/// `data_limit` is the partition's logical size; file extents are checked
/// against it. The walk must consume exactly `count` descriptors.
fn parse(
    descriptors: &[u8],
    count: u32,
    strings: &[u8],
    data_limit: u64,
) -> Result<FstNode, FstError> {
    let (end, _, root) = parse_node(descriptors, count, strings, data_limit, 0, 0)?;
    if end != count {
        return Err(FstError::CountMismatch(end, count));
    }
    Ok(root)
}

fn parse_node(
    descriptors: &[u8],
    count: u32,
    strings: &[u8],
    data_limit: u64,
    idx: u32,
    depth: u32,
) -> Result<(u32, String, FstNode), FstError> {
    if depth > MAX_DEPTH {
        return Err(FstError::TooDeep);
    }
    if idx >= count {
        return Err(FstError::DescriptorOutOfRange(idx, count));
    }
    let record = &descriptors[idx as usize * 12..][..12];
    let name_field = be_u32(record, 0);
    let data_off = be_u32(record, 4);
    let size = be_u32(record, 8);

    let is_dir = name_field & 0xFF00_0000 != 0;
    // the root has no name
    let name = if idx == 0 {
        String::new()
    } else {
        read_name(strings, name_field & 0x00FF_FFFF, idx)?
    };

    if is_dir {
        // for directories the size field is the preorder index one past
        // the subtree
        if size > count || size <= idx {
            return Err(FstError::BadSubtreeEnd(idx, size));
        }
        let mut entries: Vec<(String, FstNode)> = Vec::new();
        let mut next = idx + 1;
        while next < size {
            let (after, child_name, child) =
                parse_node(descriptors, count, strings, data_limit, next, depth + 1)?;
            if entries.iter().any(|(existing, _)| *existing == child_name) {
                return Err(FstError::DuplicateName(child_name));
            }
            entries.push((child_name, child));
            next = after;
        }
        Ok((next, name, FstNode::Directory { entries }))
    } else {
        let offset = u64::from(data_off) * 4;
        if u64::from(size) > data_limit.saturating_sub(offset) {
            return Err(FstError::FileOutOfBounds { offset, size });
        }
        Ok((idx + 1, name, FstNode::File { offset, size }))
    }
}

fn read_name(strings: &[u8], offset: u32, idx: u32) -> Result<String, FstError> {
    let tail = strings
        .get(offset as usize..)
        .ok_or(FstError::UnterminatedName(idx))?;
    let span = tail.len().min(MAX_NAME_LEN + 1);
    let nul = tail[..span]
        .iter()
        .position(|&b| b == 0)
        .ok_or(FstError::UnterminatedName(idx))?;
    Ok(WINDOWS_1252.decode(&tail[..nul]).0.into_owned())
}
