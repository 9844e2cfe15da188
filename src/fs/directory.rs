//! 目录项存储
//!
//! 目录就是一个普通的 extent 文件，只是数据按 32 字节的 `DirEntry` 排列，
//! 每块 `ENTRIES_PER_BLOCK` 个。inode 号为 0 的槽位是空位。

use serde::{Deserialize, Serialize};

use crate::fs::{
    allocator::Allocator,
    config::{DIR_ENTRY_SIZE, ENTRIES_PER_BLOCK, MAX_FILENAME_LEN},
    data_area::DataArea,
    error::{FsError, Result},
    inode_table::OnDiskInode,
};

/// 一个目录项：以 \0 结尾的文件名 + inode 号
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; MAX_FILENAME_LEN + 1],
    pub inode_no: u32,
}

/// 名字能否原样存进一个目录项：非空、不超长、不含 \0（记录里的结束符）和 '/'
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.bytes().any(|c| c == 0 || c == b'/') {
        return Err(FsError::InvalidName(name.to_string()));
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(FsError::NameTooLong(name.to_string()));
    }
    Ok(())
}

impl DirEntry {
    pub fn new(name: &str, inode_no: u32) -> Result<Self> {
        check_name(name)?;
        let bytes = name.as_bytes();
        let mut buf = [0u8; MAX_FILENAME_LEN + 1];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            name: buf,
            inode_no,
        })
    }

    /// 文件名的原始字节（不含 \0）
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.name.len());
        &self.name[..len]
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn is_free(&self) -> bool {
        self.inode_no == 0
    }

    fn decode(slot: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(slot)?)
    }

    fn encode_into(&self, slot: &mut [u8]) -> Result<()> {
        bincode::serialize_into(slot, self)?;
        Ok(())
    }
}

/// 目录里全部槽位的数据区地址，按 extent 顺序、再按槽位顺序
fn slot_addrs(dir: &OnDiskInode) -> impl Iterator<Item = u64> + '_ {
    dir.extents.iter().flat_map(|extent| {
        let slots = extent.block_count as u64 * ENTRIES_PER_BLOCK as u64;
        (0..slots).map(move |j| extent.byte_start() + j * DIR_ENTRY_SIZE as u64)
    })
}

fn read_slot(data: &DataArea, addr: u64) -> Result<DirEntry> {
    DirEntry::decode(data.bytes(addr, DIR_ENTRY_SIZE)?)
}

/// 按名字查找，名字必须长度相同且逐字节相等，第一个匹配的胜出
pub fn lookup(data: &DataArea, dir: &OnDiskInode, name: &str) -> Result<Option<u32>> {
    for addr in slot_addrs(dir) {
        let entry = read_slot(data, addr)?;
        if !entry.is_free() && entry.name_bytes() == name.as_bytes() {
            return Ok(Some(entry.inode_no));
        }
    }
    Ok(None)
}

/// 写入第一个空槽位；所有 extent 都满时给目录追加一个 1 块的 extent 再重试。
/// 追加受 4 个 extent 的上限约束，达到上限后返回 `NoExtentSlots`。
pub fn insert(
    data: &mut DataArea,
    allocator: &mut Allocator,
    dir: &mut OnDiskInode,
    name: &str,
    inode_no: u32,
) -> Result<()> {
    if inode_no == 0 {
        return Err(FsError::InvalidInode(0));
    }
    let entry = DirEntry::new(name, inode_no).inspect_err(|e| {
        log::error!("insert: {}", e);
    })?;

    loop {
        let mut free = None;
        for (ordinal, addr) in slot_addrs(dir).enumerate() {
            if read_slot(data, addr)?.is_free() {
                free = Some((ordinal, addr));
                break;
            }
        }

        if let Some((ordinal, addr)) = free {
            entry.encode_into(data.bytes_mut(addr, DIR_ENTRY_SIZE)?)?;
            let end = (ordinal as u64 + 1) * DIR_ENTRY_SIZE as u64;
            dir.size = dir.size.max(end);
            dir.touch();
            log::debug!("insert: added entry '{}' with inode {}", name, inode_no);
            return Ok(());
        }

        log::info!(
            "insert: directory {} full, allocating new extent",
            dir.ino
        );
        let extent = allocator.allocate_extent(1, dir)?;
        data.zero_extent(&extent)?;
    }
}

/// 删除名字对应的目录项，返回原先的 inode 号
pub fn remove(data: &mut DataArea, dir: &mut OnDiskInode, name: &str) -> Result<Option<u32>> {
    let mut found = None;
    for addr in slot_addrs(dir) {
        let entry = read_slot(data, addr)?;
        if !entry.is_free() && entry.name_bytes() == name.as_bytes() {
            found = Some((addr, entry.inode_no));
            break;
        }
    }

    let Some((addr, inode_no)) = found else {
        return Ok(None);
    };
    data.bytes_mut(addr, DIR_ENTRY_SIZE)?.fill(0);
    dir.touch();
    Ok(Some(inode_no))
}

/// 目录里是否还有有效目录项
pub fn is_empty(data: &DataArea, dir: &OnDiskInode) -> Result<bool> {
    match iterate(data, dir, 0).next() {
        None => Ok(true),
        Some(Err(e)) => Err(e),
        Some(Ok(_)) => Ok(false),
    }
}

/// 从槽位序号 `start` 起惰性遍历有效目录项
pub fn iterate<'a>(data: &'a DataArea, dir: &'a OnDiskInode, start: u64) -> DirIter<'a> {
    DirIter {
        data,
        dir,
        position: start,
    }
}

/// 目录遍历器。`position` 是下一个要检查的槽位序号（跨 extent 连续编号），
/// 保存下来再传给 `iterate` 可以从同一处继续。
pub struct DirIter<'a> {
    data: &'a DataArea,
    dir: &'a OnDiskInode,
    position: u64,
}

impl DirIter<'_> {
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Iterator for DirIter<'_> {
    type Item = Result<(String, u32)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (data, dir) = (self.data, self.dir);
        for addr in slot_addrs(dir).skip(self.position as usize) {
            self.position += 1;
            match read_slot(data, addr) {
                Ok(entry) if entry.is_free() => continue,
                Ok(entry) => return Some(Ok((entry.name(), entry.inode_no))),
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{
        config::MAX_EXTENTS,
        inode_table::{InodeTable, Owner, S_IFDIR},
    };

    fn setup(blocks: u32) -> (DataArea, Allocator, OnDiskInode) {
        let mut alloc = Allocator::new(blocks, 16, 1, 2);
        let mut table = InodeTable::new(3, 16);
        let dir = table
            .create_inode(&mut alloc, Owner::default(), S_IFDIR | 0o755)
            .unwrap();
        (DataArea::new(0, blocks), alloc, dir)
    }

    #[test]
    fn entry_is_fixed_size() {
        let entry = DirEntry::new("foo.txt", 3).unwrap();
        assert_eq!(
            bincode::serialized_size(&entry).unwrap() as usize,
            DIR_ENTRY_SIZE
        );
        assert_eq!(entry.name(), "foo.txt");
    }

    #[test]
    fn lookup_after_insert() {
        let (mut data, mut alloc, mut dir) = setup(16);
        insert(&mut data, &mut alloc, &mut dir, "foo.txt", 7).unwrap();
        assert_eq!(lookup(&data, &dir, "foo.txt").unwrap(), Some(7));
        assert_eq!(lookup(&data, &dir, "bar.txt").unwrap(), None);
    }

    #[test]
    fn lookup_is_exact_not_prefix() {
        let (mut data, mut alloc, mut dir) = setup(16);
        insert(&mut data, &mut alloc, &mut dir, "foobar", 2).unwrap();
        assert_eq!(lookup(&data, &dir, "foo").unwrap(), None);
        assert_eq!(lookup(&data, &dir, "foobar!").unwrap(), None);
    }

    #[test]
    fn first_match_wins() {
        let (mut data, mut alloc, mut dir) = setup(16);
        insert(&mut data, &mut alloc, &mut dir, "dup", 4).unwrap();
        insert(&mut data, &mut alloc, &mut dir, "dup", 5).unwrap();
        assert_eq!(lookup(&data, &dir, "dup").unwrap(), Some(4));
    }

    #[test]
    fn name_length_limit() {
        let (mut data, mut alloc, mut dir) = setup(16);
        let longest = "x".repeat(MAX_FILENAME_LEN);
        insert(&mut data, &mut alloc, &mut dir, &longest, 2).unwrap();
        assert_eq!(lookup(&data, &dir, &longest).unwrap(), Some(2));

        let too_long = "x".repeat(MAX_FILENAME_LEN + 1);
        assert!(matches!(
            insert(&mut data, &mut alloc, &mut dir, &too_long, 3),
            Err(FsError::NameTooLong(_))
        ));
    }

    #[test]
    fn empty_or_nul_names_are_rejected() {
        let (mut data, mut alloc, mut dir) = setup(16);
        for bad in ["", "a\0b", "a/b"] {
            assert!(matches!(
                insert(&mut data, &mut alloc, &mut dir, bad, 2),
                Err(FsError::InvalidName(_))
            ));
        }
        assert!(matches!(DirEntry::new("\0", 2), Err(FsError::InvalidName(_))));
        assert_eq!(iterate(&data, &dir, 0).count(), 0);
        assert_eq!(dir.size, 0);
    }

    #[test]
    fn inode_zero_cannot_be_inserted() {
        let (mut data, mut alloc, mut dir) = setup(16);
        assert!(matches!(
            insert(&mut data, &mut alloc, &mut dir, "ghost", 0),
            Err(FsError::InvalidInode(0))
        ));
        assert_eq!(lookup(&data, &dir, "ghost").unwrap(), None);
        assert_eq!(iterate(&data, &dir, 0).count(), 0);
    }

    #[test]
    fn remove_clears_only_the_named_slot() {
        let (mut data, mut alloc, mut dir) = setup(16);
        insert(&mut data, &mut alloc, &mut dir, "keep", 3).unwrap();
        insert(&mut data, &mut alloc, &mut dir, "drop", 4).unwrap();
        assert_eq!(remove(&mut data, &mut dir, "drop").unwrap(), Some(4));
        assert_eq!(remove(&mut data, &mut dir, "drop").unwrap(), None);
        assert_eq!(lookup(&data, &dir, "keep").unwrap(), Some(3));
    }

    #[test]
    fn freed_slot_is_reused_first() {
        let (mut data, mut alloc, mut dir) = setup(16);
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            insert(&mut data, &mut alloc, &mut dir, name, i as u32 + 1).unwrap();
        }
        assert_eq!(remove(&mut data, &mut dir, "b").unwrap(), Some(2));
        insert(&mut data, &mut alloc, &mut dir, "d", 9).unwrap();

        let names: Vec<String> = iterate(&data, &dir, 0)
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(names, vec!["a", "d", "c"]);
    }

    #[test]
    fn insert_grows_until_extent_cap() {
        let (mut data, mut alloc, mut dir) = setup(64);
        let capacity = MAX_EXTENTS * ENTRIES_PER_BLOCK;

        let mut inserted = 0;
        let err = loop {
            let name = format!("f{}", inserted);
            match insert(&mut data, &mut alloc, &mut dir, &name, inserted as u32 + 1) {
                Ok(()) => inserted += 1,
                Err(e) => break e,
            }
        };

        assert!(matches!(err, FsError::NoExtentSlots));
        assert_eq!(inserted, capacity);
        assert_eq!(dir.extent_count(), MAX_EXTENTS);
        assert_eq!(lookup(&data, &dir, "f0").unwrap(), Some(1));
        let last = format!("f{}", capacity - 1);
        assert_eq!(lookup(&data, &dir, &last).unwrap(), Some(capacity as u32));
    }

    #[test]
    fn insert_growth_fails_with_no_space_when_volume_full() {
        let (mut data, mut alloc, mut dir) = setup(1);
        for i in 0..ENTRIES_PER_BLOCK {
            insert(&mut data, &mut alloc, &mut dir, &format!("n{}", i), 1).unwrap();
        }
        assert!(matches!(
            insert(&mut data, &mut alloc, &mut dir, "overflow", 1),
            Err(FsError::NoSpace)
        ));
    }

    #[test]
    fn iterate_resumes_from_saved_position() {
        let (mut data, mut alloc, mut dir) = setup(16);
        for i in 0..10u32 {
            insert(&mut data, &mut alloc, &mut dir, &format!("e{}", i), i + 1).unwrap();
        }
        remove(&mut data, &mut dir, "e2").unwrap();

        let full: Vec<(String, u32)> = iterate(&data, &dir, 0).map(|r| r.unwrap()).collect();
        assert_eq!(full.len(), 9);

        let mut it = iterate(&data, &dir, 0);
        let head: Vec<_> = it.by_ref().take(4).map(|r| r.unwrap()).collect();
        let saved = it.position();
        let tail: Vec<_> = iterate(&data, &dir, saved).map(|r| r.unwrap()).collect();

        let mut resumed = head;
        resumed.extend(tail);
        assert_eq!(resumed, full);
    }

    #[test]
    fn iterate_spans_extents_in_order() {
        let (mut data, mut alloc, mut dir) = setup(16);
        for i in 0..ENTRIES_PER_BLOCK as u32 + 3 {
            insert(&mut data, &mut alloc, &mut dir, &format!("e{}", i), i + 1).unwrap();
        }
        assert_eq!(dir.extent_count(), 2);
        let inos: Vec<u32> = iterate(&data, &dir, 0).map(|r| r.unwrap().1).collect();
        let expected: Vec<u32> = (1..=ENTRIES_PER_BLOCK as u32 + 3).collect();
        assert_eq!(inos, expected);
    }
}
