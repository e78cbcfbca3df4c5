use std::{
    io::{Cursor, Read, Seek},
    sync::Mutex,
};

use aes::{
    cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit},
    Aes128,
};
use binrw::BinReaderExt;
use thiserror::Error;

use crate::{
    cache::LruCache,
    disc::PartitionEntry,
    image::{ImageError, ImageReader},
    structs::PartitionHeader,
    CLUSTER_CACHE_SIZE, CLUSTER_DATA_OFFSET, CLUSTER_DATA_SIZE, CLUSTER_SIZE,
};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Master key shared by all retail discs outside Korea.
pub const MASTER_KEY: [u8; 16] = [
    0xeb, 0xe4, 0x2a, 0x22, 0x5e, 0x85, 0x93, 0xe4, 0x48, 0xd9, 0xc5, 0x45, 0x73, 0x81, 0xaa, 0xf7,
];

/// Master key of Korean region discs.
pub const MASTER_KEY_KOREAN: [u8; 16] = [
    0x63, 0xb8, 0x2b, 0xb4, 0xf4, 0x61, 0x4e, 0x2e, 0x13, 0xf2, 0xfe, 0xfb, 0xba, 0x4c, 0x9b, 0x7e,
];

#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("malformed partition header: {0}")]
    MalformedHeader(String),
    #[error("read of {len:#x} bytes at {offset:#x} is outside the partition data")]
    OutOfRange { offset: u64, len: usize },
    #[error("image error: {0}")]
    Image(#[from] ImageError),
    #[error("parse error: {0}")]
    Parse(#[from] binrw::Error),
}

/// A single partition, exposing its data as a decrypted byte stream.
///
/// The stream is an array of encrypted clusters; each one is fetched and
/// decrypted on demand and kept in a bounded cache. The title key and the
/// partition location never change after open, so cached clusters stay
/// valid for the partition's whole lifetime.
pub struct Partition<'d, RS> {
    image: &'d ImageReader<RS>,
    entry: PartitionEntry,
    header: PartitionHeader,
    data_start: u64,
    data_size: u64,
    key: [u8; 16],
    clusters: Mutex<LruCache<u32, Box<[u8]>>>,
}

impl<'d, RS: Read + Seek> Partition<'d, RS> {
    pub(crate) fn open(
        image: &'d ImageReader<RS>,
        entry: PartitionEntry,
        korean: bool,
    ) -> Result<Self, PartitionError> {
        let raw = image.read_vec(entry.offset, 0x400)?;
        let header: PartitionHeader = Cursor::new(&raw).read_be()?;
        let data_start = *header.data_off;
        let data_size = *header.data_size;
        let data_end = entry
            .offset
            .checked_add(data_start)
            .and_then(|start| start.checked_add(data_size))
            .ok_or_else(|| {
                PartitionError::MalformedHeader("data area offsets overflow".into())
            })?;
        if data_end > image.size() {
            return Err(PartitionError::MalformedHeader(format!(
                "data area ends at {data_end:#x}, the image has {:#x} bytes",
                image.size()
            )));
        }
        let key = decrypt_title_key(&header.ticket.title_key, &header.ticket.title_id, korean);
        Ok(Partition {
            image,
            entry,
            header,
            data_start,
            data_size,
            key,
            clusters: Mutex::new(LruCache::new(CLUSTER_CACHE_SIZE)),
        })
    }

    /// Entry this partition was opened from.
    pub fn entry(&self) -> &PartitionEntry {
        &self.entry
    }

    /// The parsed partition header.
    pub fn header(&self) -> &PartitionHeader {
        &self.header
    }

    /// Start of the encrypted cluster area, relative to the partition.
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Raw size of the encrypted cluster area in bytes.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// The unwrapped title key the cluster payloads are encrypted with.
    pub fn decryption_key(&self) -> &[u8; 16] {
        &self.key
    }

    fn cluster_count(&self) -> u64 {
        self.data_size / CLUSTER_SIZE
    }

    /// Bytes addressable through the decrypted stream.
    pub fn logical_size(&self) -> u64 {
        self.cluster_count() * CLUSTER_DATA_SIZE
    }

    /// Reads raw, still encrypted bytes relative to the partition start.
    pub fn read_raw(&self, offset: u64, len: usize) -> Result<Vec<u8>, PartitionError> {
        Ok(self.image.read_vec(self.entry.offset + offset, len)?)
    }

    /// Fills `buf` with decrypted bytes starting at logical offset `offset`.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), PartitionError> {
        let past_end = offset
            .checked_add(buf.len() as u64)
            .map_or(true, |end| end > self.logical_size());
        if past_end {
            return Err(PartitionError::OutOfRange {
                offset,
                len: buf.len(),
            });
        }
        let mut clusters = self.clusters.lock().unwrap_or_else(|e| e.into_inner());
        let mut pos = offset;
        let mut filled = 0;
        while filled < buf.len() {
            let idx = (pos / CLUSTER_DATA_SIZE) as u32;
            let in_cluster = (pos % CLUSTER_DATA_SIZE) as usize;
            let data = clusters.get_or_insert_with(idx, || self.decrypt_cluster(idx))?;
            let take = (CLUSTER_DATA_SIZE as usize - in_cluster).min(buf.len() - filled);
            buf[filled..filled + take].copy_from_slice(&data[in_cluster..in_cluster + take]);
            pos += take as u64;
            filled += take;
        }
        Ok(())
    }

    /// Allocating variant of [`read`](Self::read).
    pub fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>, PartitionError> {
        let mut buf = vec![0; len];
        self.read(offset, &mut buf)?;
        Ok(buf)
    }

    /// Returns the decrypted payload of cluster `idx`.
    pub fn read_cluster(&self, idx: u32) -> Result<Vec<u8>, PartitionError> {
        if u64::from(idx) >= self.cluster_count() {
            return Err(PartitionError::OutOfRange {
                offset: u64::from(idx) * CLUSTER_SIZE,
                len: CLUSTER_SIZE as usize,
            });
        }
        let mut clusters = self.clusters.lock().unwrap_or_else(|e| e.into_inner());
        let data = clusters.get_or_insert_with(idx, || self.decrypt_cluster(idx))?;
        Ok(data.to_vec())
    }

    fn decrypt_cluster(&self, idx: u32) -> Result<Box<[u8]>, PartitionError> {
        let mut raw = self.read_raw(
            self.data_start + u64::from(idx) * CLUSTER_SIZE,
            CLUSTER_SIZE as usize,
        )?;
        // the IV sits inside the hash area of the raw cluster
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&raw[0x3D0..0x3E0]);
        Aes128CbcDec::new(self.key.as_ref().into(), iv.as_ref().into())
            .decrypt_padded_mut::<NoPadding>(&mut raw[CLUSTER_DATA_OFFSET as usize..])
            // the payload is a whole number of aes blocks
            .unwrap();
        Ok(raw.split_off(CLUSTER_DATA_OFFSET as usize).into_boxed_slice())
    }
}

/// Unwraps the title key with the region's master key, using the title id
/// followed by eight zero bytes as the IV.
fn decrypt_title_key(wrapped: &[u8; 16], title_id: &[u8; 8], korean: bool) -> [u8; 16] {
    let master_key = if korean {
        &MASTER_KEY_KOREAN
    } else {
        &MASTER_KEY
    };
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(title_id);
    let mut key = *wrapped;
    Aes128CbcDec::new(master_key.into(), iv.as_ref().into())
        .decrypt_padded_mut::<NoPadding>(&mut key)
        // a single aes block
        .unwrap();
    key
}
