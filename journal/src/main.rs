#[macro_use]
extern crate log;

use std::{
    fs::File,
    path::{Path, PathBuf},
    process,
    time::SystemTime,
};

use clap::{Parser, Subcommand};
use journal::{describe, image_len, IODisk};
use vsfs::{consts, InstallOutcome};

type Vsfs = vsfs::Vsfs<IODisk<File>>;

#[derive(Parser, Debug)]
#[clap(about = "Inspect and update a journaled vsfs image")]
struct Opts {
    /// Path of the filesystem image
    #[clap(long, default_value = "vsfs.img")]
    image: PathBuf,
    /// Most data records install buffers for a single transaction
    #[clap(long, default_value = "32")]
    replay_limit: usize,
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write a fresh, empty image
    Mkfs {
        /// Image size in 4 KiB blocks
        #[clap(long, default_value = "85")]
        blocks: u32,
    },
    /// Journal the creation of a file in the root directory
    Create { name: String },
    /// Apply committed journal transactions to their home blocks
    Install,
    /// List the root directory as installed
    Ls,
    /// Show journal usage
    Status,
}

enum Failure {
    Io(std::io::Error),
    Fs(vsfs::Error),
    Other(String),
}

impl From<vsfs::Error> for Failure {
    fn from(e: vsfs::Error) -> Self {
        Failure::Fs(e)
    }
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Failure::Io(e)
    }
}

fn main() {
    env_logger::init();

    let opts: Opts = Opts::parse();
    if let Err(failure) = run(opts) {
        let code = match failure {
            Failure::Io(e) => {
                error!("Failed to access image. error: {}", e);
                1
            }
            Failure::Fs(e) => {
                error!("{}", describe(&e));
                if e.is_fatal() {
                    2
                } else {
                    1
                }
            }
            Failure::Other(msg) => {
                error!("{}", msg);
                1
            }
        };
        process::exit(code);
    }
}

fn run(opts: Opts) -> Result<(), Failure> {
    if let Cmd::Mkfs { blocks } = opts.cmd {
        return mkfs(&opts.image, blocks);
    }

    let read_only = matches!(opts.cmd, Cmd::Ls | Cmd::Status);
    let fs = Vsfs::open(IODisk::open(&opts.image, read_only)?, read_only)?
        .with_replay_limit(opts.replay_limit);

    match opts.cmd {
        Cmd::Mkfs { .. } => {}
        Cmd::Create { name } => {
            let inode_id = fs.create_entry(name.as_bytes(), now_unix_timestamp()?)?;
            println!("{} -> inode {} (run install to apply)", name, inode_id);
        }
        Cmd::Install => match fs.install()? {
            InstallOutcome::Empty => println!("journal empty, nothing to install"),
            InstallOutcome::Installed {
                txns,
                blks,
                discarded,
            } => {
                println!("installed {} transactions, {} blocks", txns, blks);
                if discarded > 0 {
                    println!("discarded {} uncommitted records", discarded);
                }
            }
        },
        Cmd::Ls => {
            for entry in fs.entries()? {
                println!(
                    "{:>4} {}",
                    entry.inode_id,
                    String::from_utf8_lossy(entry.name())
                );
            }
        }
        Cmd::Status => {
            let stat = fs.journal().stat(fs.blk_device())?;
            println!("bytes used:   {} / {}", stat.bytes_used, stat.capacity);
            println!("committed:    {} transactions", stat.committed_txns);
            println!("staged:       {} blocks", stat.staged_blks);
            println!("uncommitted:  {} records", stat.uncommitted);
            println!("replay limit: {} records", fs.journal().replay_limit());
        }
    }
    Ok(())
}

fn mkfs(image: &Path, blocks: u32) -> Result<(), Failure> {
    // Checked before the image file is created or truncated.
    let capacity = image_len(blocks).ok_or_else(|| {
        Failure::Other(format!(
            "Invalid block count {}, an image needs {} to {} blocks",
            blocks,
            consts::DATA_START_BLK_ID + 1,
            u32::MAX / consts::BLOCK_SIZE
        ))
    })?;
    let fs = Vsfs::format(IODisk::create(image, capacity)?, now_unix_timestamp()?)?;
    fs.ensure_journal()?;
    println!(
        "{}: {} blocks, {} inodes",
        image.display(),
        fs.super_blk().blks_count,
        fs.super_blk().inodes_count
    );
    Ok(())
}

fn now_unix_timestamp() -> Result<u32, Failure> {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|n| n.as_secs() as u32)
        .map_err(|_| Failure::Other("SystemTime before UNIX EPOCH!".to_owned()))
}
