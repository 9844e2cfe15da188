//! Extent 表
//!
//! 每个 inode 内嵌固定 4 个槽位，`block_count == 0` 表示槽位空闲。
//! extent 按创建顺序首尾相接地覆盖文件的逻辑地址：第 i 个 extent 的逻辑起点
//! 等于前 i 个 extent 容量之和。物理位置只由 extent 自己的起始块决定：
//!
//! `physical = start_block * BLOCK_SIZE + (offset - logical_start)`
//!
//! 结果是相对数据区起点的字节地址。

use serde::{Deserialize, Serialize};

use crate::{disk::BLOCK_SIZE, fs::config::MAX_EXTENTS};

/// 一段连续的物理块
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub start_block: u32,
    pub block_count: u32,
}

impl Extent {
    pub fn new(start_block: u32, block_count: u32) -> Self {
        Self {
            start_block,
            block_count,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    /// 覆盖的字节数
    #[inline]
    pub fn byte_len(&self) -> u64 {
        self.block_count as u64 * BLOCK_SIZE as u64
    }

    /// 在数据区中的起始字节地址
    #[inline]
    pub fn byte_start(&self) -> u64 {
        self.start_block as u64 * BLOCK_SIZE as u64
    }

    /// 末尾块号（不含）。用 u64 计算，损坏的记录也不会溢出
    #[inline]
    pub fn end_block(&self) -> u64 {
        self.start_block as u64 + self.block_count as u64
    }
}

/// 逻辑偏移定位到的 extent 片段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// 片段在数据区中的字节地址
    pub physical: u64,
    /// 从该地址起到 extent 末尾还剩多少字节
    pub available: u64,
}

/// 定长的 extent 数组加使用计数，按值嵌在 inode 记录里
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentList {
    slots: [Extent; MAX_EXTENTS],
    count: u32,
}

impl ExtentList {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 原始槽位，包括空槽
    pub fn slots(&self) -> &[Extent; MAX_EXTENTS] {
        &self.slots
    }

    /// 第一个空闲槽位的下标
    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Extent::is_empty)
    }

    /// 把 extent 放进第一个空闲槽位，没有空位时返回 None
    pub fn push(&mut self, extent: Extent) -> Option<usize> {
        let index = self.free_slot()?;
        self.slots[index] = extent;
        self.count += 1;
        Some(index)
    }

    /// 按槽位顺序遍历在用的 extent
    pub fn iter(&self) -> impl Iterator<Item = &Extent> + '_ {
        self.slots.iter().filter(|e| !e.is_empty())
    }

    /// 每个在用 extent 连同它覆盖的逻辑起点
    pub fn iter_logical(&self) -> impl Iterator<Item = (u64, &Extent)> + '_ {
        self.iter().scan(0u64, |logical, extent| {
            let start = *logical;
            *logical += extent.byte_len();
            Some((start, extent))
        })
    }

    /// 所有 extent 合计能容纳的字节数
    pub fn capacity(&self) -> u64 {
        self.iter().map(Extent::byte_len).sum()
    }

    /// 所有 extent 合计的块数
    pub fn total_blocks(&self) -> u32 {
        self.iter()
            .fold(0u32, |total, e| total.saturating_add(e.block_count))
    }

    /// 把逻辑偏移翻译为数据区内的字节地址
    pub fn map(&self, offset: u64) -> Option<Mapping> {
        self.iter_logical().find_map(|(logical_start, extent)| {
            let logical_end = logical_start + extent.byte_len();
            (offset >= logical_start && offset < logical_end).then(|| Mapping {
                physical: extent.byte_start() + (offset - logical_start),
                available: logical_end - offset,
            })
        })
    }

    /// 清空所有槽位，返回原先在用的 extent
    pub fn take(&mut self) -> Vec<Extent> {
        let extents = self.iter().copied().collect();
        *self = Self::default();
        extents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_fills_first_free_slot_until_full() {
        let mut list = ExtentList::new();
        for i in 0..MAX_EXTENTS as u32 {
            assert_eq!(list.push(Extent::new(i * 10, 1)), Some(i as usize));
        }
        assert_eq!(list.count(), MAX_EXTENTS);
        assert_eq!(list.push(Extent::new(99, 1)), None);
    }

    #[test]
    fn logical_ranges_follow_creation_order_not_block_order() {
        let mut list = ExtentList::new();
        list.push(Extent::new(40, 1));
        list.push(Extent::new(3, 2));

        let starts: Vec<u64> = list.iter_logical().map(|(start, _)| start).collect();
        assert_eq!(starts, vec![0, BLOCK_SIZE as u64]);

        // 第一块在物理块 40
        let m = list.map(10).unwrap();
        assert_eq!(m.physical, 40 * BLOCK_SIZE as u64 + 10);
        assert_eq!(m.available, BLOCK_SIZE as u64 - 10);

        // 逻辑上第二块开始映射到物理块 3
        let m = list.map(BLOCK_SIZE as u64 + 5).unwrap();
        assert_eq!(m.physical, 3 * BLOCK_SIZE as u64 + 5);
        assert_eq!(m.available, 2 * BLOCK_SIZE as u64 - 5);

        assert_eq!(list.map(3 * BLOCK_SIZE as u64), None);
        assert_eq!(list.capacity(), 3 * BLOCK_SIZE as u64);
    }

    #[test]
    fn end_block_of_corrupt_extent_does_not_overflow() {
        let e = Extent::new(u32::MAX - 1, 4);
        assert_eq!(e.end_block(), u32::MAX as u64 + 3);

        let mut list = ExtentList::new();
        list.push(e);
        list.push(Extent::new(0, u32::MAX));
        assert_eq!(list.total_blocks(), u32::MAX);
    }

    #[test]
    fn take_resets_the_list() {
        let mut list = ExtentList::new();
        list.push(Extent::new(1, 1));
        list.push(Extent::new(9, 2));
        let taken = list.take();
        assert_eq!(taken, vec![Extent::new(1, 1), Extent::new(9, 2)]);
        assert!(list.is_empty());
        assert_eq!(list.free_slot(), Some(0));
    }
}
