use serde::{Deserialize, Serialize};

use crate::disk::{blocks_for_bits, Block, BlockDevice, BLOCK_SIZE};

/// 数据块位图：第 i 位对应数据区的第 i 块，1 = 已分配
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataBlockBitmap {
    pub bits: Vec<u8>,     // 位图数据，每个 bit 表示一个数据块是否被使用
    pub total_blocks: u32, // 数据块总数
    pub free_blocks: u32,  // 当前空闲块数
    pub start_block: u64,  // 位图在磁盘中的起始块号
}

impl DataBlockBitmap {
    pub fn new(total_blocks: u32, start_block: u64) -> Self {
        let byte_len = ((total_blocks as usize) + 7) / 8;

        Self {
            bits: vec![0; byte_len],
            total_blocks,
            free_blocks: total_blocks,
            start_block,
        }
    }

    pub fn size_in_blocks(total_blocks: u32) -> u64 {
        blocks_for_bits(total_blocks as u64)
    }

    // 分配一个空闲的数据块，返回编号（首次适配）
    pub fn alloc(&mut self) -> Option<u32> {
        for (byte_index, byte) in self.bits.iter_mut().enumerate() {
            if *byte != 0xFF {
                let bit = byte.trailing_ones();
                let block = byte_index as u32 * 8 + bit;
                // 最后一个字节里超出总数的位不算
                if block >= self.total_blocks {
                    return None;
                }
                *byte |= 1 << bit;
                self.free_blocks -= 1;
                return Some(block);
            }
        }
        None
    }

    /// 释放一个数据块。重复释放由调用方避免。
    pub fn free(&mut self, block: u32) {
        if block >= self.total_blocks {
            log::warn!("free_block: block {} out of range, ignored", block);
            return;
        }
        self.bits[(block / 8) as usize] &= !(1 << (block % 8));
        self.free_blocks += 1;
    }

    pub fn is_used(&self, block: u32) -> bool {
        (self.bits[(block / 8) as usize] & (1 << (block % 8))) != 0
    }

    /// 从左到右寻找第一段长度为 `len` 的连续空闲块，返回起始块号。
    /// 总空闲数足够但没有一段足够长时同样返回 None。
    pub fn find_run(&self, len: u32) -> Option<u32> {
        if len == 0 {
            return None;
        }
        let mut start = 0;
        let mut run = 0;
        for block in 0..self.total_blocks {
            if self.is_used(block) {
                run = 0;
                continue;
            }
            if run == 0 {
                start = block;
            }
            run += 1;
            if run == len {
                return Some(start);
            }
        }
        None
    }

    /// 把 `[start, start + len)` 全部置位，并同步扣减空闲数
    pub fn mark_run(&mut self, start: u32, len: u32) {
        for block in start..start + len {
            self.bits[(block / 8) as usize] |= 1 << (block % 8);
        }
        self.free_blocks -= len;
    }

    pub fn count_used(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }

    // 从磁盘加载数据块位图
    pub fn load<D: BlockDevice>(
        disk: &D,
        start_block: u64,
        total_blocks: u32,
    ) -> std::io::Result<Self> {
        let size_in_block = Self::size_in_blocks(total_blocks);
        let mut bits = Vec::with_capacity(size_in_block as usize * BLOCK_SIZE);
        let mut block_buf: Block = [0; BLOCK_SIZE];

        for i in 0..size_in_block {
            disk.read_block(start_block + i, &mut block_buf)?;
            bits.extend_from_slice(&block_buf);
        }

        // 截掉多余字节，只保留有效位
        let byte_len = ((total_blocks as usize) + 7) / 8;
        bits.truncate(byte_len);

        let used: u32 = bits.iter().map(|b| b.count_ones()).sum();
        Ok(Self {
            bits,
            total_blocks,
            free_blocks: total_blocks.saturating_sub(used),
            start_block,
        })
    }

    // 将数据块位图写回磁盘
    pub fn sync<D: BlockDevice>(&self, disk: &D) -> std::io::Result<()> {
        for (i, chunk) in self.bits.chunks(BLOCK_SIZE).enumerate() {
            let mut block_buf: Block = [0; BLOCK_SIZE];
            block_buf[..chunk.len()].copy_from_slice(chunk);
            disk.write_block(self.start_block + i as u64, &block_buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_first_fit_and_bounded() {
        let mut bitmap = DataBlockBitmap::new(10, 0);
        for expected in 0..10 {
            assert_eq!(bitmap.alloc(), Some(expected));
        }
        assert_eq!(bitmap.alloc(), None);
        assert_eq!(bitmap.free_blocks, 0);

        bitmap.free(3);
        assert_eq!(bitmap.alloc(), Some(3));
    }

    #[test]
    fn find_run_requires_contiguity() {
        let mut bitmap = DataBlockBitmap::new(8, 0);
        // 占用 1、3、5、7，剩下 4 个不连续的空闲块
        bitmap.mark_run(1, 1);
        bitmap.mark_run(3, 1);
        bitmap.mark_run(5, 1);
        bitmap.mark_run(7, 1);
        assert_eq!(bitmap.free_blocks, 4);
        assert_eq!(bitmap.find_run(1), Some(0));
        assert_eq!(bitmap.find_run(2), None);
    }

    #[test]
    fn find_run_restarts_after_used_block() {
        let mut bitmap = DataBlockBitmap::new(12, 0);
        bitmap.mark_run(2, 1);
        assert_eq!(bitmap.find_run(3), Some(3));
        assert_eq!(bitmap.find_run(2), Some(0));
        assert_eq!(bitmap.find_run(0), None);
    }

    #[test]
    fn mark_run_keeps_counter_in_step() {
        let mut bitmap = DataBlockBitmap::new(100, 0);
        bitmap.mark_run(10, 25);
        assert_eq!(bitmap.count_used(), 25);
        assert_eq!(bitmap.free_blocks + bitmap.count_used(), 100);
        assert!(bitmap.is_used(10) && bitmap.is_used(34));
        assert!(!bitmap.is_used(9) && !bitmap.is_used(35));
    }
}
