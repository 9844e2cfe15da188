use std::fmt;

use crate::{
    disk::BlockDevice,
    fs::{config::MAX_EXTENTS, FileSystem},
};

/// 一致性检查的结果
#[derive(Debug, Default)]
pub struct FsckReport {
    pub inodes_checked: u32,
    pub blocks_owned: u32,
    pub errors: Vec<String>,
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for FsckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} inodes checked, {} blocks owned, {} errors",
            self.inodes_checked,
            self.blocks_owned,
            self.errors.len()
        )?;
        for e in &self.errors {
            writeln!(f, "  - {}", e)?;
        }
        Ok(())
    }
}

/// 检查计数与位图一致、extent 合法且互不重叠、已分配的块都有主
pub fn check<D: BlockDevice>(fs: &FileSystem<D>) -> FsckReport {
    let mut report = FsckReport::default();
    let alloc = &fs.allocator;

    let used_blocks = alloc.block_bitmap.count_used();
    if alloc.nr_free_blocks() + used_blocks != alloc.block_count() {
        report.errors.push(format!(
            "free block counter {} + used {} != {}",
            alloc.nr_free_blocks(),
            used_blocks,
            alloc.block_count()
        ));
    }
    let used_inodes = alloc.inode_bitmap.count_used();
    if alloc.nr_free_inodes() + used_inodes != alloc.inode_count() {
        report.errors.push(format!(
            "free inode counter {} + used {} != {}",
            alloc.nr_free_inodes(),
            used_inodes,
            alloc.inode_count()
        ));
    }

    // 每个数据块的属主
    let mut owner: Vec<u32> = vec![0; alloc.block_count() as usize];
    for ino in 1..alloc.inode_count() {
        if !alloc.inode_bitmap.is_used(ino) {
            continue;
        }
        let Some(inode) = fs.inode_table.get_inode_record(ino) else {
            report.errors.push(format!("inode {} allocated but has no record", ino));
            continue;
        };
        report.inodes_checked += 1;

        let in_use = inode.extents.slots().iter().filter(|e| !e.is_empty()).count();
        if inode.extent_count() > MAX_EXTENTS || inode.extent_count() != in_use {
            report.errors.push(format!(
                "inode {}: extent count {} but {} slots in use",
                ino,
                inode.extent_count(),
                in_use
            ));
        }

        if inode.blocks != inode.extents.total_blocks() {
            report.errors.push(format!(
                "inode {}: block counter {} but extents hold {}",
                ino,
                inode.blocks,
                inode.extents.total_blocks()
            ));
        }

        for extent in inode.extents.iter() {
            if extent.end_block() > alloc.block_count() as u64 {
                report.errors.push(format!(
                    "inode {}: extent {}+{} beyond {} blocks",
                    ino,
                    extent.start_block,
                    extent.block_count,
                    alloc.block_count()
                ));
                continue;
            }
            for block in extent.start_block..extent.start_block + extent.block_count {
                if !alloc.block_bitmap.is_used(block) {
                    report
                        .errors
                        .push(format!("inode {}: block {} not marked allocated", ino, block));
                }
                match owner[block as usize] {
                    0 => {
                        owner[block as usize] = ino;
                        report.blocks_owned += 1;
                    }
                    other => report.errors.push(format!(
                        "block {} owned by both inode {} and inode {}",
                        block, other, ino
                    )),
                }
            }
        }
    }

    for block in 0..alloc.block_count() {
        if alloc.block_bitmap.is_used(block) && owner[block as usize] == 0 {
            report
                .errors
                .push(format!("block {} allocated but owned by no inode", block));
        }
    }

    if !report.is_clean() {
        log::warn!("fsck: {} problems found", report.errors.len());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disk::MemDisk,
        fs::{
            config::{FormatOptions, ROOT_INO},
            extent::Extent,
            inode_table::{Owner, S_IFDIR, S_IFREG},
            super_block::SuperBlock,
        },
    };

    fn fresh() -> FileSystem<MemDisk> {
        let opts = FormatOptions::new(64, 32);
        let disk = MemDisk::new(SuperBlock::new(&opts).total_disk_blocks());
        FileSystem::format(disk, &opts).unwrap()
    }

    #[test]
    fn busy_volume_is_clean() {
        let mut fs = fresh();
        let dir = fs.create(ROOT_INO, "docs", S_IFDIR | 0o755, Owner::default()).unwrap();
        let file = fs.create(dir, "a.txt", S_IFREG | 0o644, Owner::default()).unwrap();
        fs.write(file, 0, &[7u8; 9000]).unwrap();
        fs.create(ROOT_INO, "b.txt", S_IFREG, Owner::default()).unwrap();
        fs.remove(ROOT_INO, "b.txt").unwrap();

        let report = check(&fs);
        assert!(report.is_clean(), "{}", report);
        assert_eq!(report.inodes_checked, 3);
        // 根目录 1 块 + docs 1 块 + a.txt 3 块
        assert_eq!(report.blocks_owned, 5);
    }

    #[test]
    fn detects_leaked_block() {
        let mut fs = fresh();
        fs.allocator.allocate_block().unwrap();
        let report = check(&fs);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("owned by no inode"));
    }

    #[test]
    fn detects_unmarked_and_shared_blocks() {
        let mut fs = fresh();
        let a = fs.create(ROOT_INO, "a", S_IFREG, Owner::default()).unwrap();
        let b = fs.create(ROOT_INO, "b", S_IFREG, Owner::default()).unwrap();
        let extent = fs.allocate_extent(a, 2).unwrap();

        // b 偷偷引用 a 的块，a 的第二块在位图里被清掉
        fs.inode_table
            .get_inode_record_mut(b)
            .unwrap()
            .extents
            .push(Extent::new(extent.start_block, 1));
        fs.allocator.block_bitmap.free(extent.start_block + 1);

        let report = check(&fs);
        assert!(!report.is_clean());
        assert!(report.errors.iter().any(|e| e.contains("owned by both")));
        assert!(report.errors.iter().any(|e| e.contains("not marked allocated")));
    }

    #[test]
    fn reports_extent_past_end_of_region() {
        let mut fs = fresh();
        let ino = fs.create(ROOT_INO, "bad", S_IFREG, Owner::default()).unwrap();
        let inode = fs.inode_table.get_inode_record_mut(ino).unwrap();
        inode.extents.push(Extent::new(u32::MAX - 1, 4));
        inode.blocks += 4;

        let report = check(&fs);
        assert_eq!(report.errors.len(), 1, "{}", report);
        assert!(report.errors[0].contains("beyond 64 blocks"));

        // 释放路径只归还区域内的块
        let free_blocks = fs.allocator.nr_free_blocks();
        fs.remove(ROOT_INO, "bad").unwrap();
        assert_eq!(fs.allocator.nr_free_blocks(), free_blocks + 1);
        assert!(check(&fs).is_clean());
    }

    #[test]
    fn detects_counter_drift() {
        let mut fs = fresh();
        fs.allocator.inode_bitmap.free_inodes += 1;
        let report = check(&fs);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("free inode counter"));
    }
}
