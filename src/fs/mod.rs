use crate::{
    disk::BlockDevice,
    fs::{
        allocator::Allocator,
        config::{FormatOptions, ROOT_INO},
        data_area::DataArea,
        data_block_bitmap::DataBlockBitmap,
        directory::DirIter,
        error::{FsError, Result, WriteFailure},
        extent::Extent,
        inode_bitmap::InodeBitmap,
        inode_table::{InodeTable, OnDiskInode, Owner, S_IFDIR},
        super_block::SuperBlock,
    },
};

pub mod allocator;
pub mod config;
pub mod data_area;
pub mod data_block_bitmap;
pub mod directory;
pub mod error;
pub mod extent;
pub mod file_io;
pub mod fsck;
pub mod inode_bitmap;
pub mod inode_table;
pub mod super_block;

/// 一个挂载中的卷。所有操作都是同步的，调用方负责串行化可变访问。
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    pub disk: D,                  // 底层磁盘抽象层
    pub super_block: SuperBlock,  // 文件系统总体信息
    pub allocator: Allocator,     // inode / 数据块分配信息
    pub inode_table: InodeTable,  // 所有 inode 管理
    pub data_area: DataArea,      // 所有数据块内容管理
}

impl<D: BlockDevice> FileSystem<D> {
    /// 在设备上写一个空卷，并建立根目录
    pub fn format(disk: D, opts: &FormatOptions) -> Result<Self> {
        let (super_block, allocator, inode_table, data_area) = blank_volume(&disk, opts)?;
        let mut fs = Self {
            disk,
            super_block,
            allocator,
            inode_table,
            data_area,
        };
        fs.make_root()?;
        fs.sync()?;
        log::info!(
            "format: {} data blocks, {} inodes, volume {}",
            opts.block_count,
            opts.inode_count,
            fs.super_block.volume_uuid()
        );
        Ok(fs)
    }

    /// 在同一设备上重建空卷，参数不合法时原状态不变
    pub fn reformat(&mut self, opts: &FormatOptions) -> Result<()> {
        let (super_block, allocator, inode_table, data_area) = blank_volume(&self.disk, opts)?;
        self.super_block = super_block;
        self.allocator = allocator;
        self.inode_table = inode_table;
        self.data_area = data_area;
        self.make_root()?;
        self.sync()?;
        log::info!("reformat: volume {}", self.super_block.volume_uuid());
        Ok(())
    }

    fn make_root(&mut self) -> Result<()> {
        let root = self.create_inode(Owner::default(), S_IFDIR | 0o755)?;
        if root.ino != ROOT_INO {
            return Err(FsError::IoFault(format!("root created as inode {}", root.ino)));
        }
        if let Some(root) = self.inode_table.get_inode_record_mut(ROOT_INO) {
            root.links = 2;
        }
        Ok(())
    }

    /// 读取超级块、位图、inode 表和数据区
    pub fn mount(disk: D) -> Result<Self> {
        let super_block = SuperBlock::load(&disk)?;
        let inode_bitmap = InodeBitmap::load(
            &disk,
            super_block.inode_bitmap_start,
            super_block.inode_count,
        )?;
        let block_bitmap = DataBlockBitmap::load(
            &disk,
            super_block.block_bitmap_start,
            super_block.block_count,
        )?;

        // 空闲数以位图为准
        if inode_bitmap.free_inodes != super_block.free_inodes
            || block_bitmap.free_blocks != super_block.free_blocks
        {
            log::warn!(
                "mount: stored free counters ({} inodes, {} blocks) differ from bitmaps ({}, {})",
                super_block.free_inodes,
                super_block.free_blocks,
                inode_bitmap.free_inodes,
                block_bitmap.free_blocks
            );
        }

        let inode_table = InodeTable::load(
            &disk,
            super_block.inode_table_start,
            super_block.inode_count,
        )?;
        let data_area = DataArea::load(
            &disk,
            super_block.data_block_start,
            super_block.block_count,
        )?;

        let fs = Self {
            allocator: Allocator::from_bitmaps(inode_bitmap, block_bitmap),
            inode_table,
            data_area,
            super_block,
            disk,
        };
        if !fs.get_inode_record(fs.root_ino()).is_some_and(OnDiskInode::is_dir) {
            return Err(FsError::Corrupted("root directory missing".to_string()));
        }

        log::info!("mount: volume {}", fs.super_block.volume_uuid());
        Ok(fs)
    }

    /// 把内存中的元数据和脏数据块写回设备
    pub fn sync(&mut self) -> Result<()> {
        self.super_block.free_inodes = self.allocator.nr_free_inodes();
        self.super_block.free_blocks = self.allocator.nr_free_blocks();

        self.super_block.sync(&self.disk)?;
        self.allocator.inode_bitmap.sync(&self.disk)?;
        self.allocator.block_bitmap.sync(&self.disk)?;
        self.inode_table.sync(&self.disk)?;
        if self.data_area.is_dirty() {
            self.data_area.sync(&self.disk)?;
        }
        log::debug!("sync: volume {} flushed", self.super_block.volume_uuid());
        Ok(())
    }

    pub fn root_ino(&self) -> u32 {
        self.super_block.root_ino
    }

    pub fn create_inode(&mut self, owner: Owner, mode: u16) -> Result<OnDiskInode> {
        let inode = self
            .inode_table
            .create_inode(&mut self.allocator, owner, mode)?;
        for extent in inode.extents.iter() {
            self.data_area.zero_extent(extent)?;
        }
        Ok(inode)
    }

    pub fn get_inode_record(&self, ino: u32) -> Option<&OnDiskInode> {
        self.inode_table.get_inode_record(ino)
    }

    fn inode(&self, ino: u32) -> Result<&OnDiskInode> {
        self.get_inode_record(ino)
            .filter(|inode| inode.ino == ino && self.allocator.inode_bitmap.is_used(ino))
            .ok_or(FsError::InvalidInode(ino))
    }

    fn dir(&self, ino: u32) -> Result<&OnDiskInode> {
        let dir = self.inode(ino)?;
        if !dir.is_dir() {
            return Err(FsError::NotADirectory(format!("inode {}", ino)));
        }
        Ok(dir)
    }

    pub fn lookup(&self, dir: u32, name: &str) -> Result<Option<u32>> {
        directory::lookup(&self.data_area, self.dir(dir)?, name)
    }

    /// 给已存在的 inode 再加一个名字，目标的链接数加一
    pub fn insert(&mut self, dir: u32, name: &str, ino: u32) -> Result<()> {
        live_inode_mut(&mut self.inode_table, &self.allocator, ino)?;
        self.add_entry(dir, name, ino)?;
        let target = live_inode_mut(&mut self.inode_table, &self.allocator, ino)?;
        target.links = target.links.saturating_add(1);
        Ok(())
    }

    fn add_entry(&mut self, dir: u32, name: &str, ino: u32) -> Result<()> {
        self.dir(dir)?;
        let dir = live_inode_mut(&mut self.inode_table, &self.allocator, dir)?;
        directory::insert(&mut self.data_area, &mut self.allocator, dir, name, ino)
    }

    pub fn iterate(&self, dir: u32, start: u64) -> Result<DirIter<'_>> {
        Ok(directory::iterate(&self.data_area, self.dir(dir)?, start))
    }

    pub fn read(&self, ino: u32, offset: u64, buf: &mut [u8]) -> Result<usize> {
        file_io::read(&self.data_area, self.inode(ino)?, offset, buf)
    }

    pub fn read_all(&self, ino: u32) -> Result<Vec<u8>> {
        file_io::read_all(&self.data_area, self.inode(ino)?)
    }

    /// 写文件；目录的数据只能经由目录项接口修改
    pub fn write(
        &mut self,
        ino: u32,
        offset: u64,
        data: &[u8],
    ) -> std::result::Result<usize, WriteFailure> {
        let is_dir = self
            .inode(ino)
            .map_err(|e| WriteFailure::new(0, e))?
            .is_dir();
        if is_dir {
            let e = FsError::IsADirectory(format!("inode {}", ino));
            return Err(WriteFailure::new(0, e));
        }
        let inode = live_inode_mut(&mut self.inode_table, &self.allocator, ino)
            .map_err(|e| WriteFailure::new(0, e))?;
        file_io::write(&mut self.data_area, &mut self.allocator, inode, offset, data)
    }

    pub fn allocate_extent(&mut self, ino: u32, required_blocks: u32) -> Result<Extent> {
        let inode = live_inode_mut(&mut self.inode_table, &self.allocator, ino)?;
        let extent = self.allocator.allocate_extent(required_blocks, inode)?;
        self.data_area.zero_extent(&extent)?;
        Ok(extent)
    }

    pub fn allocate_inode(&mut self) -> Result<u32> {
        self.allocator.allocate_inode()
    }

    pub fn free_inode(&mut self, ino: u32) {
        self.allocator.free_inode(ino)
    }

    pub fn allocate_block(&mut self) -> Result<u32> {
        self.allocator.allocate_block()
    }

    pub fn free_block(&mut self, block: u32) {
        self.allocator.free_block(block)
    }

    /// 在 `parent` 下新建一个名字：先建 inode，再写目录项，写目录项失败时回收 inode
    pub fn create(&mut self, parent: u32, name: &str, mode: u16, owner: Owner) -> Result<u32> {
        directory::check_name(name)?;
        if self.lookup(parent, name)?.is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let inode = self.create_inode(owner, mode)?;
        // 新 inode 的 links = 1 已经算上了这个名字
        if let Err(e) = self.add_entry(parent, name, inode.ino) {
            log::error!("create: failed to add directory entry for '{}': {}", name, e);
            self.inode_table
                .release_inode(&mut self.allocator, inode.ino)?;
            return Err(e);
        }

        if inode.is_dir() {
            if let Some(created) = self.inode_table.get_inode_record_mut(inode.ino) {
                created.links = 2;
            }
            if let Some(parent) = self.inode_table.get_inode_record_mut(parent) {
                parent.links += 1;
            }
        }
        log::info!("create: '{}' created with inode {}", name, inode.ino);
        Ok(inode.ino)
    }

    /// 删除名字；最后一个链接消失时经由释放路径回收 inode 及其所有块。
    /// 目录的链接数里含有自身的 "."，降到 1 即视为最后一个名字。非空目录不能删除最后一个名字。
    pub fn remove(&mut self, parent: u32, name: &str) -> Result<u32> {
        let ino = self
            .lookup(parent, name)?
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        let target = self.inode(ino)?;
        let is_dir = target.is_dir();
        let min_links = if is_dir { 2 } else { 1 };
        let last_link = target.links <= min_links;
        if is_dir && last_link && !directory::is_empty(&self.data_area, target)? {
            return Err(FsError::DirectoryNotEmpty(name.to_string()));
        }

        let dir = live_inode_mut(&mut self.inode_table, &self.allocator, parent)?;
        directory::remove(&mut self.data_area, dir, name)?;
        if is_dir && last_link {
            dir.links = dir.links.saturating_sub(1);
        }

        if !last_link {
            let target = live_inode_mut(&mut self.inode_table, &self.allocator, ino)?;
            target.links -= 1;
            target.touch();
            log::info!(
                "remove: '{}' unlinked, inode {} still has {} links",
                name,
                ino,
                target.links
            );
            return Ok(ino);
        }

        self.inode_table.release_inode(&mut self.allocator, ino)?;
        log::info!("remove: '{}' (inode {}) released", name, ino);
        Ok(ino)
    }
}

/// 按格式化参数在内存中搭出一个空卷的各个部分
fn blank_volume<D: BlockDevice>(
    disk: &D,
    opts: &FormatOptions,
) -> Result<(SuperBlock, Allocator, InodeTable, DataArea)> {
    if opts.inode_count <= ROOT_INO || opts.block_count == 0 {
        return Err(FsError::NoSpace);
    }
    let super_block = SuperBlock::new(opts);
    if super_block.total_disk_blocks() > disk.block_count() {
        log::error!(
            "format: volume needs {} blocks, device has {}",
            super_block.total_disk_blocks(),
            disk.block_count()
        );
        return Err(FsError::NoSpace);
    }

    let allocator = Allocator::new(
        opts.block_count,
        opts.inode_count,
        super_block.inode_bitmap_start,
        super_block.block_bitmap_start,
    );
    let inode_table = InodeTable::new(super_block.inode_table_start, opts.inode_count);
    let data_area = DataArea::new(super_block.data_block_start, opts.block_count);
    Ok((super_block, allocator, inode_table, data_area))
}

/// 已分配 inode 的可变记录。只借用 inode 表，调用方还能同时借用分配器和数据区。
fn live_inode_mut<'a>(
    table: &'a mut InodeTable,
    allocator: &Allocator,
    ino: u32,
) -> Result<&'a mut OnDiskInode> {
    match table.get_inode_record_mut(ino) {
        Some(inode) if inode.ino == ino && allocator.inode_bitmap.is_used(ino) => Ok(inode),
        _ => Err(FsError::InvalidInode(ino)),
    }
}
