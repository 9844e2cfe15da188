use crate::fs::{
    data_block_bitmap::DataBlockBitmap,
    error::{FsError, Result},
    extent::Extent,
    inode_bitmap::InodeBitmap,
    inode_table::OnDiskInode,
};

/// 卷上的分配状态：两张位图和各自的空闲计数。
///
/// 每次翻转位都在同一个调用里更新计数，`free + popcount == total` 始终成立。
/// 内部不加锁，并发访问由调用方串行化。
#[derive(Debug, Clone)]
pub struct Allocator {
    pub inode_bitmap: InodeBitmap,
    pub block_bitmap: DataBlockBitmap,
}

impl Allocator {
    pub fn new(
        block_count: u32,
        inode_count: u32,
        inode_bitmap_start: u64,
        block_bitmap_start: u64,
    ) -> Self {
        Self {
            inode_bitmap: InodeBitmap::new(inode_count, inode_bitmap_start),
            block_bitmap: DataBlockBitmap::new(block_count, block_bitmap_start),
        }
    }

    pub fn from_bitmaps(inode_bitmap: InodeBitmap, block_bitmap: DataBlockBitmap) -> Self {
        Self {
            inode_bitmap,
            block_bitmap,
        }
    }

    pub fn inode_count(&self) -> u32 {
        self.inode_bitmap.total_inodes
    }

    pub fn block_count(&self) -> u32 {
        self.block_bitmap.total_blocks
    }

    pub fn nr_free_inodes(&self) -> u32 {
        self.inode_bitmap.free_inodes
    }

    pub fn nr_free_blocks(&self) -> u32 {
        self.block_bitmap.free_blocks
    }

    pub fn allocate_inode(&mut self) -> Result<u32> {
        self.inode_bitmap.alloc().ok_or_else(|| {
            log::error!("allocate_inode: no free inode available");
            FsError::NoSpace
        })
    }

    pub fn free_inode(&mut self, ino: u32) {
        self.inode_bitmap.free(ino);
    }

    pub fn allocate_block(&mut self) -> Result<u32> {
        self.block_bitmap.alloc().ok_or_else(|| {
            log::error!("allocate_block: no free data block available");
            FsError::NoSpace
        })
    }

    pub fn free_block(&mut self, block: u32) {
        self.block_bitmap.free(block);
    }

    /// 为 inode 追加一个恰好 `required_blocks` 块的连续 extent。
    ///
    /// 整段必须物理连续：空闲块总数足够但没有一段够长时同样返回 `NoSpace`。
    /// 找到区间后才检查槽位，4 个槽位都在用时返回 `NoExtentSlots`，此时位图不变。
    pub fn allocate_extent(&mut self, required_blocks: u32, inode: &mut OnDiskInode) -> Result<Extent> {
        let Some(start_block) = self.block_bitmap.find_run(required_blocks) else {
            log::error!(
                "allocate_extent: no contiguous run of {} blocks ({} free)",
                required_blocks,
                self.nr_free_blocks()
            );
            return Err(FsError::NoSpace);
        };
        let extent = Extent::new(start_block, required_blocks);

        if inode.extents.push(extent).is_none() {
            log::error!("allocate_extent: inode {} has no free extent slot", inode.ino);
            return Err(FsError::NoExtentSlots);
        }
        self.block_bitmap.mark_run(start_block, required_blocks);
        inode.blocks += required_blocks;

        log::debug!(
            "allocate_extent: inode {} gets blocks {}..{}",
            inode.ino,
            start_block,
            extent.end_block()
        );
        Ok(extent)
    }

    /// 归还 inode 所有 extent 的块并清空其 extent 表
    pub fn release_extents(&mut self, inode: &mut OnDiskInode) -> Vec<Extent> {
        let extents = inode.extents.take();
        let limit = self.block_count() as u64;
        for extent in &extents {
            if extent.end_block() > limit {
                log::warn!(
                    "release_extents: inode {} extent {}+{} beyond {} blocks, clipped",
                    inode.ino,
                    extent.start_block,
                    extent.block_count,
                    limit
                );
            }
            for block in extent.start_block as u64..extent.end_block().min(limit) {
                self.block_bitmap.free(block as u32);
            }
        }
        inode.blocks = 0;
        extents
    }
}
