//! On-disc structures, all big endian.

use std::ops::Deref;

use binrw::BinRead;

/// Offset stored shifted right by two on disc, read back as the byte value.
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(big)]
pub struct ShiftedU64(#[br(map = |x: u32| u64::from(x) * 4)] pub u64);

impl Deref for ShiftedU64 {
    type Target = u64;

    fn deref(&self) -> &u64 {
        &self.0
    }
}

/// Disc header at offset 0 of the image.
#[derive(BinRead, Debug, Clone)]
#[br(big)]
pub struct DiscHeader {
    pub disc_id: u8,
    pub game_code: [u8; 2],
    pub region_code: u8,
    pub maker_code: [u8; 2],
    pub disc_number: u8,
    pub disc_version: u8,
    /// 0x5D1C9EA3 on every Wii disc.
    #[br(pad_before = 16)]
    pub wii_magic: u32,
    /// Game title, NUL padded.
    #[br(pad_before = 4)]
    pub title: [u8; 64],
}

/// One row of the volume group table at 0x40000.
#[derive(BinRead, Debug, Clone, Copy)]
#[br(big)]
pub struct VolumeGroupEntry {
    pub partition_count: u32,
    pub table_offset: ShiftedU64,
}

/// One row of a volume group's partition table.
#[derive(BinRead, Debug, Clone, Copy)]
#[br(big)]
pub struct PartitionTableEntry {
    pub offset: ShiftedU64,
    pub kind: u32,
}

/// Ticket at the start of a partition, 0x2A4 bytes.
///
/// Only the wrapped title key and the title id matter for decryption; the
/// signature fields are carried for completeness and never verified.
#[derive(BinRead, Debug, Clone)]
#[br(big)]
pub struct Ticket {
    pub sig_type: u32,
    pub sig: [u8; 0x100],
    #[br(pad_before = 0x3C)]
    pub sig_issuer: [u8; 0x40],
    pub ecdh: [u8; 0x3C],
    /// Title key, AES encrypted with the region's master key.
    #[br(pad_before = 3)]
    pub title_key: [u8; 16],
    #[br(pad_before = 1)]
    pub ticket_id: [u8; 8],
    pub console_id: u32,
    /// Doubles as the IV for unwrapping the title key.
    pub title_id: [u8; 8],
    #[br(pad_before = 2, pad_after = 0xBC)]
    pub ticket_version: u16,
}

/// Partition header, read from the first kilobyte of a partition.
#[derive(BinRead, Debug, Clone)]
#[br(big)]
pub struct PartitionHeader {
    pub ticket: Ticket,
    pub tmd_size: u32,
    pub tmd_off: ShiftedU64,
    pub cert_chain_size: u32,
    pub cert_chain_off: ShiftedU64,
    pub global_hash_table_off: ShiftedU64,
    /// Start of the encrypted cluster area, relative to the partition.
    pub data_off: ShiftedU64,
    /// Raw size of the encrypted cluster area.
    pub data_size: ShiftedU64,
}
