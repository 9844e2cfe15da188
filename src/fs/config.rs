use serde::{Deserialize, Serialize};

use crate::disk::BLOCK_SIZE;

/// 超级块固定在 0 号块
pub const SUPER_BLOCK_BLOCK_ID: u64 = 0;

/// 魔数，用于识别文件系统
pub const FS_MAGIC: u64 = 0x4558_5446_5331; // "EXTFS1"

// 每个 Inode 槽位 128 字节，一个 4KB 块可以存 32 个 Inode
pub const INODE_SIZE: usize = 128;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// 每个 inode 内嵌的 extent 槽位数，决定了 inode 记录的大小，不可更改
pub const MAX_EXTENTS: usize = 4;

/// 文件名最长字节数，记录里再留 1 字节给 \0
pub const MAX_FILENAME_LEN: usize = 27;
pub const DIR_ENTRY_SIZE: usize = 32;
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

/// 0 号 inode 保留为"空槽位"，根目录是第一个可分配的 inode
pub const ROOT_INO: u32 = 1;

/// 格式化参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOptions {
    /// 数据区块数
    pub block_count: u32,
    /// inode 总数（含保留的 0 号）
    pub inode_count: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            block_count: 4096,
            inode_count: 1024,
        }
    }
}

impl FormatOptions {
    pub fn new(block_count: u32, inode_count: u32) -> Self {
        Self {
            block_count,
            inode_count,
        }
    }
}
