//! Disc level parsing: metadata and the volume group / partition tables.

use std::io::{Cursor, Read, Seek};

use binrw::BinReaderExt;
use encoding_rs::WINDOWS_1252;
use thiserror::Error;

use crate::{
    image::{ImageError, ImageReader},
    partition::{Partition, PartitionError},
    structs::{DiscHeader, PartitionTableEntry, VolumeGroupEntry},
};

/// Magic number identifying a Wii disc image.
pub const WII_MAGIC: u32 = 0x5D1C9EA3;

/// Offset of the volume group table on the disc.
const VGTABLE_OFFSET: u64 = 0x40000;
/// Every disc carries four volume groups, most populate only the first.
const VOLUME_GROUP_COUNT: usize = 4;
/// Tables declaring more partitions than this are considered corrupt.
const MAX_PARTITIONS_PER_GROUP: u32 = 256;

#[derive(Error, Debug)]
pub enum DiscError {
    #[error("wrong magic number on the disc image: {0:#010x}")]
    InvalidMagic(u32),
    #[error("malformed partition table: {0}")]
    MalformedTable(String),
    #[error("image error: {0}")]
    Image(#[from] ImageError),
    #[error("parse error: {0}")]
    Parse(#[from] binrw::Error),
}

/// Metadata from the first bytes of the disc, fixed once the image is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscMetadata {
    pub disc_id: u8,
    pub game_code: [u8; 2],
    pub region_code: u8,
    pub maker_code: [u8; 2],
    pub disc_number: u8,
    pub disc_version: u8,
    pub magic: u32,
    pub title: String,
}

impl DiscMetadata {
    /// The six character game id, e.g. `RSPE01`.
    pub fn id(&self) -> String {
        [
            self.disc_id,
            self.game_code[0],
            self.game_code[1],
            self.region_code,
            self.maker_code[0],
            self.maker_code[1],
        ]
        .iter()
        .map(|&b| b as char)
        .collect()
    }
}

/// Partition type from the partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    /// Game data.
    Data,
    /// System update.
    Update,
    /// Channel installer.
    Channel,
    Other(u32),
}

impl From<u32> for PartitionKind {
    fn from(raw: u32) -> Self {
        match raw {
            0 => PartitionKind::Data,
            1 => PartitionKind::Update,
            2 => PartitionKind::Channel,
            other => PartitionKind::Other(other),
        }
    }
}

impl PartitionKind {
    pub fn raw(&self) -> u32 {
        match self {
            PartitionKind::Data => 0,
            PartitionKind::Update => 1,
            PartitionKind::Channel => 2,
            PartitionKind::Other(raw) => *raw,
        }
    }
}

/// Location of one partition on the disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    /// Volume group the partition was declared in.
    pub volume_group: u8,
    /// Position within the volume group.
    pub index: u32,
    /// Absolute byte offset of the partition in the image.
    pub offset: u64,
    pub kind: PartitionKind,
}

/// An open disc image.
pub struct Disc<RS> {
    image: ImageReader<RS>,
    metadata: DiscMetadata,
    partitions: Vec<PartitionEntry>,
}

impl<RS: Read + Seek> Disc<RS> {
    /// Opens a disc image, parsing its header and partition tables.
    pub fn open(source: RS) -> Result<Self, DiscError> {
        let image = ImageReader::new(source)?;
        let metadata = read_metadata(&image)?;
        let partitions = read_partition_tables(&image)?;
        Ok(Disc {
            image,
            metadata,
            partitions,
        })
    }

    pub fn metadata(&self) -> &DiscMetadata {
        &self.metadata
    }

    /// All partitions, in volume group order, then declared order.
    pub fn partitions(&self) -> &[PartitionEntry] {
        &self.partitions
    }

    /// The partitions holding game data.
    pub fn game_partitions(&self) -> impl Iterator<Item = &PartitionEntry> {
        self.partitions
            .iter()
            .filter(|p| p.kind == PartitionKind::Data)
    }

    /// Opens the given partition, unwrapping its title key.
    pub fn open_partition(
        &self,
        entry: &PartitionEntry,
    ) -> Result<Partition<'_, RS>, PartitionError> {
        Partition::open(&self.image, *entry, self.metadata.region_code == b'K')
    }

    /// The raw image reader shared by every partition.
    pub fn image(&self) -> &ImageReader<RS> {
        &self.image
    }
}

fn read_metadata<RS: Read + Seek>(image: &ImageReader<RS>) -> Result<DiscMetadata, DiscError> {
    let raw = image.read_vec(0, 0x60)?;
    let header: DiscHeader = Cursor::new(&raw).read_be()?;
    if header.wii_magic != WII_MAGIC {
        return Err(DiscError::InvalidMagic(header.wii_magic));
    }
    Ok(DiscMetadata {
        disc_id: header.disc_id,
        game_code: header.game_code,
        region_code: header.region_code,
        maker_code: header.maker_code,
        disc_number: header.disc_number,
        disc_version: header.disc_version,
        magic: header.wii_magic,
        title: decode_title(&header.title),
    })
}

fn decode_title(raw: &[u8; 64]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    WINDOWS_1252.decode(&raw[..end]).0.into_owned()
}

fn read_partition_tables<RS: Read + Seek>(
    image: &ImageReader<RS>,
) -> Result<Vec<PartitionEntry>, DiscError> {
    let raw = image.read_vec(VGTABLE_OFFSET, 8 * VOLUME_GROUP_COUNT)?;
    let mut groups = Cursor::new(&raw);
    let mut partitions = Vec::new();
    for group in 0..VOLUME_GROUP_COUNT {
        let vg: VolumeGroupEntry = groups.read_be()?;
        if vg.partition_count == 0 {
            continue;
        }
        if vg.partition_count > MAX_PARTITIONS_PER_GROUP {
            return Err(DiscError::MalformedTable(format!(
                "volume group {group} declares {} partitions",
                vg.partition_count
            )));
        }
        let table_size = 8 * vg.partition_count as u64;
        if (*vg.table_offset).saturating_add(table_size) > image.size() {
            return Err(DiscError::MalformedTable(format!(
                "table of volume group {group} at {:#x} is past the image end",
                *vg.table_offset
            )));
        }
        let raw_table = image.read_vec(*vg.table_offset, table_size as usize)?;
        let mut table = Cursor::new(&raw_table);
        for index in 0..vg.partition_count {
            let row: PartitionTableEntry = table.read_be()?;
            if *row.offset >= image.size() {
                return Err(DiscError::MalformedTable(format!(
                    "partition {group}/{index} starts at {:#x}, past the image end",
                    *row.offset
                )));
            }
            partitions.push(PartitionEntry {
                volume_group: group as u8,
                index,
                offset: *row.offset,
                kind: row.kind.into(),
            });
        }
    }
    Ok(partitions)
}
