use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{blocks_for, Block, BlockDevice, BLOCK_SIZE},
    fs::{
        allocator::Allocator,
        config::{INODES_PER_BLOCK, INODE_SIZE},
        error::{FsError, Result},
        extent::{Extent, ExtentList},
    },
    utils::current_timestamp,
};

/// mode 中表示文件类型的位
pub const S_IFMT: u16 = 0o170000;
pub const S_IFDIR: u16 = 0o040000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFLNK: u16 = 0o120000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    File,      // 文件
    Directory, // 目录
    Symlink,   // 符号链接，指向另一个文件路径
}

impl InodeType {
    /// 从 mode 的类型位解析，其他类型一律不支持
    pub fn from_mode(mode: u16) -> Option<Self> {
        match mode & S_IFMT {
            S_IFREG => Some(Self::File),
            S_IFDIR => Some(Self::Directory),
            S_IFLNK => Some(Self::Symlink),
            _ => None,
        }
    }
}

bitflags! {
    /// mode 的权限位（类似 Unix: rwxr-xr-x）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u16 {
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXEC = 0o100;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXEC = 0o010;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXEC = 0o001;
    }
}

impl Permissions {
    pub const FILE_DEFAULT: Self = Self::from_bits_truncate(0o644);
    pub const DIR_DEFAULT: Self = Self::from_bits_truncate(0o755);

    pub fn from_mode(mode: u16) -> Self {
        Self::from_bits_truncate(mode)
    }

    /// 形如 `rwxr-xr-x` 的表示
    pub fn to_rwx(self) -> String {
        const FLAGS: [(Permissions, char); 9] = [
            (Permissions::OWNER_READ, 'r'),
            (Permissions::OWNER_WRITE, 'w'),
            (Permissions::OWNER_EXEC, 'x'),
            (Permissions::GROUP_READ, 'r'),
            (Permissions::GROUP_WRITE, 'w'),
            (Permissions::GROUP_EXEC, 'x'),
            (Permissions::OTHER_READ, 'r'),
            (Permissions::OTHER_WRITE, 'w'),
            (Permissions::OTHER_EXEC, 'x'),
        ];
        FLAGS
            .iter()
            .map(|&(flag, c)| if self.contains(flag) { c } else { '-' })
            .collect()
    }
}

/// 文件属主
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// 磁盘上的 inode 记录。bincode 定长编码后写进 128 字节槽位的开头。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnDiskInode {
    pub ino: u32,
    pub mode: u16,       // 类型位 + 权限位
    pub links: u16,      // 硬链接数
    pub uid: u32,        // 所属用户
    pub gid: u32,        // 所属组
    pub size: u64,       // 文件大小（字节）
    pub blocks: u32,     // 占用的数据块数
    pub atime: i64,      // 最后访问时间
    pub mtime: i64,      // 最后修改时间
    pub ctime: i64,      // 状态改变时间
    pub extents: ExtentList,
}

impl OnDiskInode {
    pub fn inode_type(&self) -> Option<InodeType> {
        InodeType::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.inode_type() == Some(InodeType::Directory)
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::from_mode(self.mode)
    }

    pub fn extent_count(&self) -> usize {
        self.extents.count()
    }

    // 更新时间戳
    pub fn touch(&mut self) {
        let now = current_timestamp();
        self.atime = now;
        self.mtime = now;
        self.ctime = now;
    }

    /// 编码进一个 inode 槽位
    pub fn encode_into(&self, slot: &mut [u8]) -> Result<()> {
        slot.fill(0);
        bincode::serialize_into(slot, self)?;
        Ok(())
    }

    pub fn decode(slot: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(slot)?)
    }
}

/// inode 表：按 inode 编号直接索引，0 号不用
#[derive(Debug)]
pub struct InodeTable {
    pub inodes: Vec<OnDiskInode>,
    pub start_block: u64,
    pub total_inodes: u32,
}

impl InodeTable {
    pub fn new(start_block: u64, total_inodes: u32) -> Self {
        Self {
            inodes: vec![OnDiskInode::default(); total_inodes as usize],
            start_block,
            total_inodes,
        }
    }

    /// inode 表在磁盘上占用的块数
    pub fn size_in_blocks(total_inodes: u32) -> u64 {
        blocks_for(total_inodes as u64 * INODE_SIZE as u64)
    }

    /// `0 < ino < total_inodes` 才有记录
    pub fn get_inode_record(&self, ino: u32) -> Option<&OnDiskInode> {
        if ino == 0 || ino >= self.total_inodes {
            return None;
        }
        self.inodes.get(ino as usize)
    }

    pub fn get_inode_record_mut(&mut self, ino: u32) -> Option<&mut OnDiskInode> {
        if ino == 0 || ino >= self.total_inodes {
            return None;
        }
        self.inodes.get_mut(ino as usize)
    }

    /// 分配并初始化一个新 inode，附带一个 1 块的初始 extent。
    ///
    /// 预留 inode 编号之后的任何失败都会把编号还回位图，不会留下半初始化的 inode。
    pub fn create_inode(
        &mut self,
        allocator: &mut Allocator,
        owner: Owner,
        mode: u16,
    ) -> Result<OnDiskInode> {
        if allocator.nr_free_inodes() == 0 || allocator.nr_free_blocks() == 0 {
            return Err(FsError::NoSpace);
        }
        if InodeType::from_mode(mode).is_none() {
            log::error!(
                "create_inode: file type {:#o} not supported (only directory, regular file and symlink)",
                mode & S_IFMT
            );
            return Err(FsError::UnsupportedType(mode));
        }

        let ino = allocator.allocate_inode()?;
        let Some(record) = self.get_inode_record_mut(ino) else {
            log::error!("create_inode: no record for reserved inode {}", ino);
            allocator.free_inode(ino);
            return Err(FsError::IoFault(format!("inode {} missing from table", ino)));
        };

        *record = OnDiskInode {
            ino,
            mode,
            links: 1,
            uid: owner.uid,
            gid: owner.gid,
            ..Default::default()
        };
        record.touch();

        if let Err(e) = allocator.allocate_extent(1, record) {
            log::error!("create_inode: failed to allocate initial extent: {}", e);
            *record = OnDiskInode::default();
            allocator.free_inode(ino);
            return Err(e);
        }

        log::debug!("create_inode: inode {} mode {:#o}", ino, mode);
        Ok(*record)
    }

    /// 释放路径：归还全部 extent 的块，清零槽位，清除 inode 位
    pub fn release_inode(&mut self, allocator: &mut Allocator, ino: u32) -> Result<Vec<Extent>> {
        let record = self
            .get_inode_record_mut(ino)
            .ok_or(FsError::InvalidInode(ino))?;
        let extents = allocator.release_extents(record);
        *record = OnDiskInode::default();
        allocator.free_inode(ino);
        log::debug!("release_inode: inode {} freed {} extents", ino, extents.len());
        Ok(extents)
    }

    pub fn sync<D: BlockDevice>(&self, disk: &D) -> Result<()> {
        for (i, chunk) in self.inodes.chunks(INODES_PER_BLOCK).enumerate() {
            let mut block_buf: Block = [0; BLOCK_SIZE];
            for (slot, inode) in block_buf.chunks_mut(INODE_SIZE).zip(chunk) {
                inode.encode_into(slot)?;
            }
            disk.write_block(self.start_block + i as u64, &block_buf)?;
        }
        Ok(())
    }

    pub fn load<D: BlockDevice>(disk: &D, start_block: u64, total_inodes: u32) -> Result<Self> {
        let mut inodes = Vec::with_capacity(total_inodes as usize);
        let mut block_buf: Block = [0; BLOCK_SIZE];

        for i in 0..Self::size_in_blocks(total_inodes) {
            disk.read_block(start_block + i, &mut block_buf)?;
            for slot in block_buf.chunks(INODE_SIZE) {
                if inodes.len() == total_inodes as usize {
                    break;
                }
                inodes.push(OnDiskInode::decode(slot)?);
            }
        }

        Ok(Self {
            inodes,
            start_block,
            total_inodes,
        })
    }
}
