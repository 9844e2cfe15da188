use std::{
    io::{Error, ErrorKind, Result},
    sync::Mutex,
};

use crate::disk::{
    block_device::BlockDevice,
    types::{Block, BLOCK_SIZE},
};

/// 完全驻留内存的磁盘，主要供测试使用
#[derive(Debug)]
pub struct MemDisk {
    data: Mutex<Vec<u8>>,
    total_blocks: u64,
}

impl MemDisk {
    pub fn new(total_blocks: u64) -> Self {
        Self {
            data: Mutex::new(vec![0u8; total_blocks as usize * BLOCK_SIZE]),
            total_blocks,
        }
    }

    fn range(&self, block_id: u64) -> Result<std::ops::Range<usize>> {
        if block_id >= self.total_blocks {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("block {} out of range", block_id),
            ));
        }
        let start = block_id as usize * BLOCK_SIZE;
        Ok(start..start + BLOCK_SIZE)
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
        let range = self.range(block_id)?;
        let data = self
            .data
            .lock()
            .map_err(|_| Error::new(ErrorKind::Other, "disk lock poisoned"))?;
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &Block) -> Result<()> {
        let range = self.range(block_id)?;
        let mut data = self
            .data
            .lock()
            .map_err(|_| Error::new(ErrorKind::Other, "disk lock poisoned"))?;
        data[range].copy_from_slice(buf);
        Ok(())
    }

    fn block_count(&self) -> u64 {
        self.total_blocks
    }
}
