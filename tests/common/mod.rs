//! Builds synthetic encrypted disc images for the integration tests.
#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use aes::{
    cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit},
    Aes128,
};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

pub const CLUSTER_SIZE: u64 = 0x8000;
pub const CLUSTER_DATA_SIZE: u64 = 0x7C00;

/// Title id baked into every fixture partition.
pub const TITLE_ID: [u8; 8] = [0xC0, 1, 2, 3, 4, 5, 6, 7];
/// Title key the fixture clusters are encrypted with.
pub const TITLE_KEY: [u8; 16] = [0x5C; 16];

pub enum Entry {
    File { name: String, data: Vec<u8> },
    Dir { name: String, children: Vec<Entry> },
}

pub fn file(name: &str, data: Vec<u8>) -> Entry {
    Entry::File {
        name: name.to_owned(),
        data,
    }
}

pub fn dir(name: &str, children: Vec<Entry>) -> Entry {
    Entry::Dir {
        name: name.to_owned(),
        children,
    }
}

/// Deterministic filler bytes so ranges can be compared across reads.
pub fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (seed as usize).wrapping_add(i.wrapping_mul(31)) as u8)
        .collect()
}

pub struct PartitionSpec {
    pub volume_group: usize,
    pub kind: u32,
    /// Master key the title key gets wrapped with.
    pub master_key: [u8; 16],
    pub entries: Vec<Entry>,
}

fn encrypt_cbc(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let len = data.len();
    Aes128CbcEnc::new(key.into(), iv.as_ref().into())
        .encrypt_padded_mut::<NoPadding>(data, len)
        .unwrap();
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

struct FstBuilder {
    descriptors: Vec<u8>,
    strings: Vec<u8>,
    files: Vec<(usize, Vec<u8>)>,
}

impl FstBuilder {
    fn name(&mut self, name: &str) -> u32 {
        let off = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        off
    }

    fn push(&mut self, name_field: u32, data_off: u32, size: u32) -> usize {
        let idx = self.descriptors.len() / 12;
        self.descriptors.extend_from_slice(&name_field.to_be_bytes());
        self.descriptors.extend_from_slice(&data_off.to_be_bytes());
        self.descriptors.extend_from_slice(&size.to_be_bytes());
        idx
    }

    fn patch_size(&mut self, idx: usize, size: u32) {
        self.descriptors[idx * 12 + 8..idx * 12 + 12].copy_from_slice(&size.to_be_bytes());
    }

    fn add(&mut self, entries: &[Entry]) {
        for entry in entries {
            match entry {
                Entry::File { name, data } => {
                    let name_off = self.name(name);
                    let idx = self.push(name_off, 0, data.len() as u32);
                    self.files.push((idx, data.clone()));
                }
                Entry::Dir { name, children } => {
                    let name_off = self.name(name) | 0x0100_0000;
                    let idx = self.push(name_off, 0, 0);
                    self.add(children);
                    let end = (self.descriptors.len() / 12) as u32;
                    self.patch_size(idx, end);
                }
            }
        }
    }
}

fn build_partition(spec: &PartitionSpec) -> Vec<u8> {
    let mut fst = FstBuilder {
        descriptors: Vec::new(),
        strings: Vec::new(),
        files: Vec::new(),
    };
    fst.push(0x0100_0000, 0, 0);
    fst.add(&spec.entries);
    let count = (fst.descriptors.len() / 12) as u32;
    fst.patch_size(0, count);

    // lay out the logical stream: fst first, then the file data
    let fst_offset: u64 = 0x440;
    let mut data_cursor = align_up(fst_offset + fst.descriptors.len() as u64, 0x40)
        + align_up(fst.strings.len() as u64, 0x40);
    let mut placements = Vec::new();
    for (desc_idx, data) in &fst.files {
        let off = data_cursor;
        fst.descriptors[desc_idx * 12 + 4..desc_idx * 12 + 8]
            .copy_from_slice(&((off / 4) as u32).to_be_bytes());
        data_cursor = align_up(off + data.len() as u64, 0x40);
        placements.push((off, data.clone()));
    }

    let logical_len = align_up(data_cursor, CLUSTER_DATA_SIZE);
    let mut logical = vec![0u8; logical_len as usize];
    logical[0x424..0x428].copy_from_slice(&((fst_offset / 4) as u32).to_be_bytes());
    logical[fst_offset as usize..][..fst.descriptors.len()].copy_from_slice(&fst.descriptors);
    logical[fst_offset as usize + fst.descriptors.len()..][..fst.strings.len()]
        .copy_from_slice(&fst.strings);
    for (off, data) in placements {
        logical[off as usize..][..data.len()].copy_from_slice(&data);
    }

    // partition header: wrapped title key, title id, data area location
    let cluster_count = logical.len() / CLUSTER_DATA_SIZE as usize;
    let data_size = cluster_count as u64 * CLUSTER_SIZE;
    let mut blob = vec![0u8; 0x20000];
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&TITLE_ID);
    let mut wrapped = TITLE_KEY;
    encrypt_cbc(&spec.master_key, &iv, &mut wrapped);
    blob[0x1BF..0x1CF].copy_from_slice(&wrapped);
    blob[0x1DC..0x1E4].copy_from_slice(&TITLE_ID);
    blob[0x2B8..0x2BC].copy_from_slice(&((0x20000u32 / 4).to_be_bytes()));
    blob[0x2BC..0x2C0].copy_from_slice(&(((data_size / 4) as u32).to_be_bytes()));

    for idx in 0..cluster_count {
        let mut cluster = vec![0u8; CLUSTER_SIZE as usize];
        let mut iv = [0u8; 16];
        iv[..4].copy_from_slice(&(idx as u32).to_be_bytes());
        cluster[0x3D0..0x3E0].copy_from_slice(&iv);
        cluster[0x400..]
            .copy_from_slice(&logical[idx * CLUSTER_DATA_SIZE as usize..][..CLUSTER_DATA_SIZE as usize]);
        encrypt_cbc(&TITLE_KEY, &iv, &mut cluster[0x400..]);
        blob.extend_from_slice(&cluster);
    }
    blob
}

/// Assembles a full image: header, volume group tables, partitions.
pub fn build_image(region: u8, specs: &[PartitionSpec]) -> Vec<u8> {
    let mut image = vec![0u8; 0x50000];
    image[0] = b'R';
    image[1..3].copy_from_slice(b"WI");
    image[3] = region;
    image[4..6].copy_from_slice(b"01");
    image[0x18..0x1C].copy_from_slice(&0x5D1C9EA3u32.to_be_bytes());
    image[0x20..0x2B].copy_from_slice(b"wiiod tests");

    let mut offsets = Vec::new();
    for spec in specs {
        offsets.push(image.len() as u64);
        image.extend_from_slice(&build_partition(spec));
    }

    for group in 0..4usize {
        let members: Vec<usize> = specs
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.volume_group == group)
            .map(|(idx, _)| idx)
            .collect();
        if members.is_empty() {
            continue;
        }
        let table_off = 0x40100 + group * 0x40;
        image[0x40000 + 8 * group..][..4]
            .copy_from_slice(&(members.len() as u32).to_be_bytes());
        image[0x40000 + 8 * group + 4..][..4]
            .copy_from_slice(&((table_off as u32 / 4).to_be_bytes()));
        for (row, &spec_idx) in members.iter().enumerate() {
            let base = table_off + row * 8;
            image[base..base + 4]
                .copy_from_slice(&((offsets[spec_idx] / 4) as u32).to_be_bytes());
            image[base + 4..base + 8].copy_from_slice(&specs[spec_idx].kind.to_be_bytes());
        }
    }
    image
}

/// The directory layout most tests share.
pub fn standard_entries() -> Vec<Entry> {
    vec![
        file("opening.bnr", pattern(1, 0x40)),
        dir(
            "data",
            vec![
                file("big.bin", pattern(7, 5 * CLUSTER_DATA_SIZE as usize + 0x123)),
                file("small.txt", b"hello wii".to_vec()),
            ],
        ),
        dir("empty", Vec::new()),
    ]
}

/// Reader wrapper counting positional reads, for the cache tests.
pub struct CountingReader<RS> {
    inner: RS,
    seeks: Arc<AtomicUsize>,
}

impl<RS> CountingReader<RS> {
    pub fn new(inner: RS) -> (Self, Arc<AtomicUsize>) {
        let seeks = Arc::new(AtomicUsize::new(0));
        (
            CountingReader {
                inner,
                seeks: seeks.clone(),
            },
            seeks,
        )
    }
}

impl<RS: std::io::Read> std::io::Read for CountingReader<RS> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<RS: std::io::Seek> std::io::Seek for CountingReader<RS> {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        if matches!(pos, std::io::SeekFrom::Start(_)) {
            self.seeks.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.seek(pos)
    }
}
