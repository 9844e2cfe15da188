use extent_fs::{
    fs::{
        config::{ENTRIES_PER_BLOCK, MAX_EXTENTS, ROOT_INO},
        fsck,
        inode_table::{Owner, S_IFDIR, S_IFREG},
        super_block::SuperBlock,
    },
    BlockDevice, FileDisk, FileSystem, FormatOptions, FsError, MemDisk, BLOCK_SIZE,
};

fn fresh(opts: FormatOptions) -> FileSystem<MemDisk> {
    let disk = MemDisk::new(SuperBlock::new(&opts).total_disk_blocks());
    FileSystem::format(disk, &opts).unwrap()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn file_grows_to_second_extent() {
    let mut fs = fresh(FormatOptions::new(100, 50));
    let ino = fs
        .create(ROOT_INO, "a", S_IFREG | 0o644, Owner::default())
        .unwrap();
    assert_eq!(fs.get_inode_record(ino).unwrap().extent_count(), 1);

    let data = pattern(5000);
    assert_eq!(fs.write(ino, 0, &data).unwrap(), 5000);

    let inode = fs.get_inode_record(ino).unwrap();
    assert_eq!(inode.size, 5000);
    assert_eq!(inode.extent_count(), 2);

    let mut buf = vec![0u8; 5000];
    assert_eq!(fs.read(ino, 0, &mut buf).unwrap(), 5000);
    assert_eq!(buf, data);
    assert!(fsck::check(&fs).is_clean());
}

#[test]
fn remount_preserves_tree_and_counters() {
    let mut fs = fresh(FormatOptions::new(128, 64));
    let dir = fs
        .create(ROOT_INO, "docs", S_IFDIR | 0o755, Owner::default())
        .unwrap();
    let file = fs
        .create(dir, "report.txt", S_IFREG | 0o600, Owner { uid: 1000, gid: 100 })
        .unwrap();
    let data = pattern(3 * BLOCK_SIZE + 17);
    fs.write(file, 0, &data).unwrap();
    fs.sync().unwrap();

    let free_blocks = fs.allocator.nr_free_blocks();
    let free_inodes = fs.allocator.nr_free_inodes();
    let volume = fs.super_block.volume_uuid();

    let fs = FileSystem::mount(fs.disk).unwrap();
    assert_eq!(fs.super_block.volume_uuid(), volume);
    assert_eq!(fs.allocator.nr_free_blocks(), free_blocks);
    assert_eq!(fs.allocator.nr_free_inodes(), free_inodes);
    assert_eq!(fs.lookup(ROOT_INO, "docs").unwrap(), Some(dir));
    assert_eq!(fs.lookup(dir, "report.txt").unwrap(), Some(file));

    let inode = fs.get_inode_record(file).unwrap();
    assert_eq!((inode.uid, inode.gid), (1000, 100));
    assert_eq!(fs.read_all(file).unwrap(), data);
    assert!(fsck::check(&fs).is_clean());
}

#[test]
fn mount_rejects_blank_device() {
    let disk = MemDisk::new(64);
    assert!(matches!(
        FileSystem::mount(disk),
        Err(FsError::Corrupted(_))
    ));
}

#[test]
fn directory_stops_at_extent_cap() {
    let mut fs = fresh(FormatOptions::new(256, 1024));
    let dir = fs
        .create(ROOT_INO, "big", S_IFDIR | 0o755, Owner::default())
        .unwrap();
    let capacity = MAX_EXTENTS * ENTRIES_PER_BLOCK;

    for i in 0..capacity {
        fs.insert(dir, &format!("e{}", i), ROOT_INO).unwrap();
    }
    assert_eq!(fs.get_inode_record(dir).unwrap().extent_count(), MAX_EXTENTS);
    assert!(matches!(
        fs.insert(dir, "overflow", ROOT_INO),
        Err(FsError::NoExtentSlots)
    ));

    let names: Vec<String> = fs
        .iterate(dir, 0)
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect();
    assert_eq!(names.len(), capacity);
    assert_eq!(names.first().map(String::as_str), Some("e0"));
    assert_eq!(names.last(), Some(&format!("e{}", capacity - 1)));
}

#[test]
fn remove_returns_every_block() {
    let mut fs = fresh(FormatOptions::new(64, 16));
    let before = fs.allocator.nr_free_blocks();
    let ino = fs.create(ROOT_INO, "tmp", S_IFREG, Owner::default()).unwrap();
    fs.write(ino, 0, &pattern(2 * BLOCK_SIZE + 1)).unwrap();
    assert!(fs.allocator.nr_free_blocks() < before);

    fs.remove(ROOT_INO, "tmp").unwrap();
    assert_eq!(fs.allocator.nr_free_blocks(), before);
    assert_eq!(fs.lookup(ROOT_INO, "tmp").unwrap(), None);
    assert!(fsck::check(&fs).is_clean());
}

#[test]
fn full_volume_keeps_partial_write() {
    // 根目录占 1 块，文件初始 1 块，只剩 2 块可增长
    let mut fs = fresh(FormatOptions::new(4, 8));
    let ino = fs.create(ROOT_INO, "fill", S_IFREG, Owner::default()).unwrap();

    let failure = fs.write(ino, 0, &pattern(5 * BLOCK_SIZE)).unwrap_err();
    assert!(matches!(failure.error, FsError::NoSpace));
    assert_eq!(failure.written, 3 * BLOCK_SIZE);
    assert_eq!(fs.get_inode_record(ino).unwrap().size, 3 * BLOCK_SIZE as u64);
    assert_eq!(fs.allocator.nr_free_blocks(), 0);
    assert!(fsck::check(&fs).is_clean());
}

#[test]
fn file_disk_round_trip() {
    let dir = std::env::temp_dir().join(format!("extent-fs-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("volume.img");
    let _ = std::fs::remove_file(&path);

    let opts = FormatOptions::new(32, 16);
    let total = SuperBlock::new(&opts).total_disk_blocks();
    let (tx, _rx) = std::sync::mpsc::channel();

    let mut fs = FileSystem::format(FileDisk::open(&path, total, &tx).unwrap(), &opts).unwrap();
    let ino = fs.create(ROOT_INO, "hello", S_IFREG, Owner::default()).unwrap();
    fs.write(ino, 0, b"hello, extents").unwrap();
    fs.sync().unwrap();
    drop(fs);

    let disk = FileDisk::open(&path, total, &tx).unwrap();
    assert_eq!(disk.block_count(), total);
    let fs = FileSystem::mount(disk).unwrap();
    assert_eq!(fs.read_all(ino).unwrap(), b"hello, extents");

    std::fs::remove_dir_all(&dir).unwrap();
}
