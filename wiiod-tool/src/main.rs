use clap::Parser;
use std::{
    fs::File,
    io::{self, Read, Seek, Write},
    path::PathBuf,
};
use thiserror::Error;
use wiiod::{
    Disc, DiscError, Filesystem, FsError, FstError, FstNode, PartitionEntry, PartitionError,
};

#[derive(Debug, Parser)]
#[clap(about = "Utility to inspect encrypted wii disc images")]
enum Commands {
    #[clap(about = "show the disc metadata")]
    Info { filename: PathBuf },
    #[clap(about = "list the partitions of the image")]
    Partitions { filename: PathBuf },
    #[clap(about = "print all file names in a game partition")]
    Tree {
        filename: PathBuf,
        #[clap(long)]
        partition: Option<usize>,
    },
    #[clap(about = "extract a single file from a game partition")]
    Extract {
        filename: PathBuf,
        path: String,
        destination: PathBuf,
        #[clap(long)]
        partition: Option<usize>,
    },
}

#[derive(Error, Debug)]
enum MyError {
    #[error("IO Error: {0}")]
    IOError(#[from] io::Error),
    #[error("{0}")]
    Disc(#[from] DiscError),
    #[error("{0}")]
    Partition(#[from] PartitionError),
    #[error("{0}")]
    Fst(#[from] FstError),
    #[error("{0}")]
    Fs(#[from] FsError),
    #[error("no game partition on the disc")]
    NoGamePartition,
    #[error("there are {0} game partitions on the disc, pass --partition to pick one")]
    AmbiguousPartition(usize),
    #[error("invalid partition index {0}, there are {1} game partitions")]
    BadPartitionIndex(usize, usize),
}

fn select_game_partition<RS: Read + Seek>(
    disc: &Disc<RS>,
    index: Option<usize>,
) -> Result<&PartitionEntry, MyError> {
    let parts: Vec<&PartitionEntry> = disc.game_partitions().collect();
    if parts.is_empty() {
        return Err(MyError::NoGamePartition);
    }
    match index {
        None if parts.len() > 1 => Err(MyError::AmbiguousPartition(parts.len())),
        None => Ok(parts[0]),
        Some(i) => parts
            .get(i)
            .copied()
            .ok_or(MyError::BadPartitionIndex(i, parts.len())),
    }
}

fn print_tree(name: &str, node: &FstNode, depth: usize) {
    match node {
        FstNode::File { size, .. } => {
            println!("{:indent$}{name} ({size} bytes)", "", indent = depth * 2);
        }
        FstNode::Directory { entries } => {
            println!("{:indent$}{name}/", "", indent = depth * 2);
            for (child_name, child) in entries {
                print_tree(child_name, child, depth + 1);
            }
        }
    }
}

fn main() -> Result<(), MyError> {
    let args = Commands::parse();
    match args {
        Commands::Info { filename } => {
            let disc = Disc::open(File::open(filename)?)?;
            let meta = disc.metadata();
            println!("id:      {}", meta.id());
            println!("title:   {}", meta.title);
            println!("region:  {}", meta.region_code as char);
            println!("disc:    {} (version {})", meta.disc_number, meta.disc_version);
        }
        Commands::Partitions { filename } => {
            let disc = Disc::open(File::open(filename)?)?;
            for part in disc.partitions() {
                println!(
                    "{}/{}: {:?} at {:#X}",
                    part.volume_group, part.index, part.kind, part.offset
                );
            }
        }
        Commands::Tree {
            filename,
            partition,
        } => {
            let disc = Disc::open(File::open(filename)?)?;
            let entry = select_game_partition(&disc, partition)?;
            let part = disc.open_partition(entry)?;
            let fs = Filesystem::new(&part)?;
            if let FstNode::Directory { entries } = fs.root() {
                for (name, node) in entries {
                    print_tree(name, node, 0);
                }
            }
        }
        Commands::Extract {
            filename,
            path,
            destination,
            partition,
        } => {
            let disc = Disc::open(File::open(filename)?)?;
            let entry = select_game_partition(&disc, partition)?;
            let part = disc.open_partition(entry)?;
            let fs = Filesystem::new(&part)?;
            let mut handle = fs.open(&path)?;
            let mut data = Vec::with_capacity(handle.size() as usize);
            handle.read_to_end(&mut data)?;
            let mut out = File::create(&destination)?;
            out.write_all(&data)?;
            out.flush()?;
            println!("{} bytes written to {}", data.len(), destination.display());
        }
    }
    Ok(())
}
