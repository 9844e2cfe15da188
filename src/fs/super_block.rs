use serde::{Deserialize, Serialize};

use crate::{
    disk::{Block, BlockDevice, BLOCK_SIZE},
    fs::{
        config::{FormatOptions, FS_MAGIC, ROOT_INO, SUPER_BLOCK_BLOCK_ID},
        data_block_bitmap::DataBlockBitmap,
        error::{FsError, Result},
        inode_bitmap::InodeBitmap,
        inode_table::InodeTable,
    },
    utils::{current_timestamp, generate_uuid},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub magic: u64, //魔数，用于识别文件系统
    pub block_size: u32, // 每块大小（字节）
    /** 数据块信息 */
    pub block_count: u32, // 数据区块数
    pub free_blocks: u32, // 当前空闲块数
    pub data_block_start: u64, // 数据区起始块号
    /** inode 信息 */
    pub inode_count: u32, // 总 inode 数
    pub free_inodes: u32, // 当前空闲 inode 数
    pub inode_table_start: u64, // inode 表起始块号
    pub root_ino: u32,
    /** 位图信息 */
    pub inode_bitmap_start: u64, // inode 位图起始块
    pub block_bitmap_start: u64, // 数据块位图起始块
    /** 其他元信息 */
    pub volume_id: [u8; 16],
    pub created: i64,
}

impl SuperBlock {
    /// 按格式化参数计算各区域的位置：超级块、inode 位图、块位图、inode 表、数据区依次排列
    pub fn new(opts: &FormatOptions) -> Self {
        let superblock_size = 1; // 超级块占 1 块

        let inode_bitmap_start = SUPER_BLOCK_BLOCK_ID + superblock_size;
        let block_bitmap_start = inode_bitmap_start + InodeBitmap::size_in_blocks(opts.inode_count);
        let inode_table_start =
            block_bitmap_start + DataBlockBitmap::size_in_blocks(opts.block_count);
        let data_block_start = inode_table_start + InodeTable::size_in_blocks(opts.inode_count);

        Self {
            magic: FS_MAGIC,
            block_size: BLOCK_SIZE as u32,
            block_count: opts.block_count,
            free_blocks: opts.block_count,
            data_block_start,
            inode_count: opts.inode_count,
            // 0 号保留
            free_inodes: opts.inode_count.saturating_sub(1),
            inode_table_start,
            root_ino: ROOT_INO,
            inode_bitmap_start,
            block_bitmap_start,
            volume_id: generate_uuid(),
            created: current_timestamp(),
        }
    }

    /// 整个卷占用的块数
    pub fn total_disk_blocks(&self) -> u64 {
        self.data_block_start + self.block_count as u64
    }

    pub fn volume_uuid(&self) -> uuid::Uuid {
        uuid::Uuid::from_bytes(self.volume_id)
    }

    pub fn sync<D: BlockDevice>(&self, disk: &D) -> Result<()> {
        let mut block_buf: Block = [0; BLOCK_SIZE];
        bincode::serialize_into(&mut block_buf[..], self)?;
        disk.write_block(SUPER_BLOCK_BLOCK_ID, &block_buf)?;
        Ok(())
    }

    /// 读出并校验超级块
    pub fn load<D: BlockDevice>(disk: &D) -> Result<Self> {
        let mut block_buf: Block = [0; BLOCK_SIZE];
        disk.read_block(SUPER_BLOCK_BLOCK_ID, &mut block_buf)?;
        let sb: SuperBlock = bincode::deserialize(&block_buf)
            .map_err(|e| FsError::Corrupted(format!("superblock: {}", e)))?;

        if sb.magic != FS_MAGIC {
            return Err(FsError::Corrupted(format!("bad magic {:#x}", sb.magic)));
        }
        if sb.block_size as usize != BLOCK_SIZE {
            return Err(FsError::Corrupted(format!(
                "unsupported block size {}",
                sb.block_size
            )));
        }
        let expected = Self::new(&FormatOptions::new(sb.block_count, sb.inode_count));
        if sb.data_block_start != expected.data_block_start
            || sb.inode_table_start != expected.inode_table_start
        {
            return Err(FsError::Corrupted("region layout mismatch".to_string()));
        }
        if sb.total_disk_blocks() > disk.block_count() {
            return Err(FsError::Corrupted(format!(
                "volume needs {} blocks, device has {}",
                sb.total_disk_blocks(),
                disk.block_count()
            )));
        }
        Ok(sb)
    }
}
