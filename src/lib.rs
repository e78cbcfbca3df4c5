//! Read-only access to the contents of encrypted Wii disc images.
//!
//! A disc image is opened with [`Disc`], which parses the disc header and the
//! volume group / partition tables. [`Disc::open_partition`] unwraps the title
//! key of one partition and exposes its decrypted data stream, and
//! [`Filesystem::new`] parses that partition's file system table so files can
//! be looked up by path and read through a [`FileHandle`].
//!
//! ```no_run
//! use std::{fs::File, io::Read};
//! use wiiod::{Disc, Filesystem};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let disc = Disc::open(File::open("game.iso")?)?;
//! println!("{}", disc.metadata().title);
//! let entry = *disc.game_partitions().next().ok_or("no game partition")?;
//! let partition = disc.open_partition(&entry)?;
//! let fs = Filesystem::new(&partition)?;
//! for name in fs.list_dir("/")? {
//!     println!("{name}");
//! }
//! let mut banner = Vec::new();
//! let mut file = fs.open("/opening.bnr")?;
//! file.read_to_end(&mut banner)?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod disc;
pub mod fs;
pub mod fst;
pub mod image;
pub mod partition;
pub mod structs;

pub use disc::{Disc, DiscError, DiscMetadata, PartitionEntry, PartitionKind, WII_MAGIC};
pub use fs::{FileHandle, Filesystem, FsError, Stat, StatKind};
pub use fst::{Fst, FstError, FstNode};
pub use image::{ImageError, ImageReader};
pub use partition::{Partition, PartitionError};

/// Size of one encrypted cluster on disc.
pub const CLUSTER_SIZE: u64 = 0x8000;
/// Offset of the encrypted payload inside a cluster, past the hash area.
pub const CLUSTER_DATA_OFFSET: u64 = 0x400;
/// Decrypted payload bytes carried by one cluster.
pub const CLUSTER_DATA_SIZE: u64 = 0x7C00;
/// Number of decrypted clusters a partition keeps cached.
pub const CLUSTER_CACHE_SIZE: usize = 128;
