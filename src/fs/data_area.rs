use crate::{
    disk::{Block, BlockDevice, BLOCK_SIZE},
    fs::{
        error::{FsError, Result},
        extent::Extent,
    },
};

/// 数据区：块号 i 的内容位于 `i * BLOCK_SIZE` 处，整块扁平存放在内存里，
/// 只有被修改过的块在 sync 时写回。
#[derive(Debug, Clone)]
pub struct DataArea {
    blocks: Vec<u8>,       // 数据块
    pub total_blocks: u32, // 块总数
    pub start_block: u64,  // 数据区在磁盘上的起始块号
    dirty: Vec<bool>,      // 每个块是否被修改
}

impl DataArea {
    pub fn new(start_block: u64, total_blocks: u32) -> Self {
        Self {
            blocks: vec![0u8; total_blocks as usize * BLOCK_SIZE], // 扁平化存储
            total_blocks,
            start_block,
            dirty: vec![false; total_blocks as usize],
        }
    }

    fn check(&self, addr: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let start = addr as usize;
        let end = start + len;
        if end > self.blocks.len() {
            return Err(FsError::IoFault(format!(
                "data access {}..{} beyond region of {} bytes",
                start,
                end,
                self.blocks.len()
            )));
        }
        Ok(start..end)
    }

    /// 读取数据区内 `[addr, addr + len)` 的字节
    pub fn bytes(&self, addr: u64, len: usize) -> Result<&[u8]> {
        let range = self.check(addr, len)?;
        Ok(&self.blocks[range])
    }

    /// 可写地借出一段字节，涉及的块都会被标脏
    pub fn bytes_mut(&mut self, addr: u64, len: usize) -> Result<&mut [u8]> {
        let range = self.check(addr, len)?;
        if len > 0 {
            let first = range.start / BLOCK_SIZE;
            let last = (range.end - 1) / BLOCK_SIZE;
            self.dirty[first..=last].fill(true);
        }
        Ok(&mut self.blocks[range])
    }

    /// 新分配的 extent 先清零，旧数据不会泄露进文件或目录
    pub fn zero_extent(&mut self, extent: &Extent) -> Result<()> {
        self.bytes_mut(extent.byte_start(), extent.byte_len() as usize)?
            .fill(0);
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.iter().any(|&d| d)
    }

    pub fn sync<D: BlockDevice>(&mut self, disk: &D) -> std::io::Result<()> {
        let mut written = 0;
        for i in 0..self.total_blocks as usize {
            if self.dirty[i] {
                let start = i * BLOCK_SIZE;

                // 临时数组，写入 disk
                let mut buf: Block = [0u8; BLOCK_SIZE];
                buf.copy_from_slice(&self.blocks[start..start + BLOCK_SIZE]);

                disk.write_block(self.start_block + i as u64, &buf)?;
                self.dirty[i] = false;
                written += 1;
            }
        }
        log::debug!("data area: {} dirty blocks written", written);
        Ok(())
    }

    pub fn load<D: BlockDevice>(
        disk: &D,
        start_block: u64,
        total_blocks: u32,
    ) -> std::io::Result<Self> {
        let mut area = Self::new(start_block, total_blocks);
        let mut buf: Block = [0u8; BLOCK_SIZE];
        for i in 0..total_blocks as usize {
            disk.read_block(start_block + i as u64, &mut buf)?;
            let start = i * BLOCK_SIZE;
            area.blocks[start..start + BLOCK_SIZE].copy_from_slice(&buf);
        }
        Ok(area)
    }
}
