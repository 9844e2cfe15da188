use serde::{Deserialize, Serialize};

use crate::disk::{blocks_for_bits, Block, BlockDevice, BLOCK_SIZE};

/// inode 位图：1 = 已分配，0 = 空闲。0 号位永久保留，inode 编号从 1 开始。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InodeBitmap {
    pub bits: Vec<u8>,     // 位图数据，每个 bit 表示一个 inode 的状态
    pub total_inodes: u32, // inode 总数（含 0 号）
    pub free_inodes: u32,  // 当前空闲 inode 数
    pub start_block: u64,  // 位图在磁盘中的起始块号（用于持久化）
}

impl InodeBitmap {
    // 创建一个新的 inode 位图，只有保留的 0 号位被置位
    pub fn new(total_inodes: u32, start_block: u64) -> Self {
        let byte_len = ((total_inodes as usize) + 7) / 8;
        let mut bitmap = Self {
            bits: vec![0; byte_len],
            total_inodes,
            free_inodes: total_inodes,
            start_block,
        };
        if total_inodes > 0 {
            bitmap.bits[0] |= 1;
            bitmap.free_inodes -= 1;
        }
        bitmap
    }

    /// 位图在磁盘上占用的块数
    pub fn size_in_blocks(total_inodes: u32) -> u64 {
        blocks_for_bits(total_inodes as u64)
    }

    /// 从 1 号开始线性扫描第一个空闲位，置位并返回其编号
    pub fn alloc(&mut self) -> Option<u32> {
        for ino in 1..self.total_inodes {
            if !self.is_used(ino) {
                self.set(ino);
                self.free_inodes -= 1;
                return Some(ino);
            }
        }
        None // 没有空闲 inode
    }

    /// 释放一个 inode。重复释放由调用方避免，这里不做校验。
    pub fn free(&mut self, ino: u32) {
        if ino == 0 || ino >= self.total_inodes {
            log::warn!("free_inode: inode {} out of range, ignored", ino);
            return;
        }
        let byte_index = (ino / 8) as usize;
        self.bits[byte_index] &= !(1 << (ino % 8));
        self.free_inodes += 1;
    }

    // 检查 inode 是否被占用
    pub fn is_used(&self, ino: u32) -> bool {
        let byte_index = (ino / 8) as usize;
        (self.bits[byte_index] & (1 << (ino % 8))) != 0
    }

    fn set(&mut self, ino: u32) {
        self.bits[(ino / 8) as usize] |= 1 << (ino % 8);
    }

    /// 已置位的个数（含保留位）
    pub fn count_used(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    /// 从磁盘加载 inode 位图，空闲数按置位个数重新计算
    pub fn load<D: BlockDevice>(
        disk: &D,
        start_block: u64,
        total_inodes: u32,
    ) -> std::io::Result<Self> {
        let size_in_block = Self::size_in_blocks(total_inodes);
        let mut bits = Vec::with_capacity(size_in_block as usize * BLOCK_SIZE);
        let mut block_buf: Block = [0; BLOCK_SIZE];

        for i in 0..size_in_block {
            disk.read_block(start_block + i, &mut block_buf)?;
            bits.extend_from_slice(&block_buf);
        }

        // 截掉多余的字节
        let byte_len = ((total_inodes as usize) + 7) / 8;
        bits.truncate(byte_len);

        let used: u32 = bits.iter().map(|b| b.count_ones()).sum();
        Ok(Self {
            bits,
            total_inodes,
            free_inodes: total_inodes.saturating_sub(used),
            start_block,
        })
    }

    // 将 inode 位图写回磁盘，不够一块的用 0 填充
    pub fn sync<D: BlockDevice>(&self, disk: &D) -> std::io::Result<()> {
        for (i, chunk) in self.bits.chunks(BLOCK_SIZE).enumerate() {
            let mut block_buf: Block = [0; BLOCK_SIZE];
            block_buf[..chunk.len()].copy_from_slice(chunk);
            disk.write_block(self.start_block + i as u64, &block_buf)?;
        }
        Ok(())
    }
}
