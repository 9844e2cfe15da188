pub mod disk;
pub mod fs;
pub mod utils;

pub use disk::{BlockDevice, FileDisk, MemDisk, BLOCK_SIZE};
pub use fs::{
    config::FormatOptions,
    error::{FsError, Result, WriteFailure},
    FileSystem,
};
