use std::{
    fs::{File, OpenOptions},
    io::{Error, ErrorKind, Read, Result, Seek, SeekFrom, Write},
    path::Path,
    sync::{mpsc::Sender, Mutex, MutexGuard},
};

use crate::disk::{
    block_device::BlockDevice,
    init::BootProgress,
    types::{Block, BLOCK_SIZE},
};

/// 以普通文件模拟的磁盘镜像
#[derive(Debug)]
pub struct FileDisk {
    file: Mutex<File>,
    total_blocks: u64,
}

impl FileDisk {
    /// 打开（必要时创建）镜像文件，并保证其至少有 `total_blocks` 块大小
    pub fn open(path: &Path, total_blocks: u64, tx: &Sender<BootProgress>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let disk_size = total_blocks * BLOCK_SIZE as u64;
        let current = file.metadata()?.len();
        if current < disk_size {
            let _ = tx.send(BootProgress::Step("🪶 Allocating disk space..."));
            file.set_len(disk_size)?;
            log::info!("disk image {} grown to {} bytes", path.display(), disk_size);
        }
        let _ = tx.send(BootProgress::Progress(50));

        // 已有镜像可能比请求的大，以实际大小为准
        let total_blocks = file.metadata()?.len() / BLOCK_SIZE as u64;
        Ok(Self {
            file: Mutex::new(file),
            total_blocks,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, File>> {
        self.file
            .lock()
            .map_err(|_| Error::new(ErrorKind::Other, "disk lock poisoned"))
    }

    fn check_range(&self, block_id: u64) -> Result<()> {
        if block_id >= self.total_blocks {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("block {} out of range ({} blocks)", block_id, self.total_blocks),
            ));
        }
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
        self.check_range(block_id)?;
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(block_id * BLOCK_SIZE as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &Block) -> Result<()> {
        self.check_range(block_id)?;
        let mut file = self.lock()?;
        file.seek(SeekFrom::Start(block_id * BLOCK_SIZE as u64))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn block_count(&self) -> u64 {
        self.total_blocks
    }
}
