//! 文件读写：把 (inode, 偏移, 长度) 翻译成数据区上的一串拷贝。
//!
//! 逻辑偏移按 extent 的创建顺序依次落在各个 extent 上（见 `extent` 模块），
//! 读写两条路径用同一套换算。

use crate::fs::{
    allocator::Allocator,
    data_area::DataArea,
    error::{FsError, Result, WriteFailure},
    inode_table::OnDiskInode,
};

/// 从 `offset` 起读到 `buf` 里，返回读到的字节数。不会越过文件大小，也不会读未分配的块。
pub fn read(data: &DataArea, inode: &OnDiskInode, offset: u64, buf: &mut [u8]) -> Result<usize> {
    if inode.extents.is_empty() || offset >= inode.size {
        return Ok(0);
    }
    let len = (buf.len() as u64).min(inode.size - offset) as usize;

    let mut pos = offset;
    let mut done = 0;
    for (logical_start, extent) in inode.extents.iter_logical() {
        if done == len {
            break;
        }
        let logical_end = logical_start + extent.byte_len();
        if pos >= logical_start && pos < logical_end {
            let n = ((len - done) as u64).min(logical_end - pos) as usize;
            let physical = extent.byte_start() + (pos - logical_start);
            buf[done..done + n].copy_from_slice(data.bytes(physical, n)?);
            pos += n as u64;
            done += n;
        }
    }
    Ok(done)
}

/// 把 `input` 写到 `offset` 处，空间不够时每次追加一个 1 块的 extent。
///
/// 文件大小只增不减。中途失败时已经写进去的部分保留，`WriteFailure::written` 给出其长度。
pub fn write(
    data: &mut DataArea,
    allocator: &mut Allocator,
    inode: &mut OnDiskInode,
    offset: u64,
    input: &[u8],
) -> std::result::Result<usize, WriteFailure> {
    let mut written = 0;
    let mut pos = offset;

    if inode.extents.is_empty() {
        grow(data, allocator, inode).map_err(|e| WriteFailure::new(written, e))?;
    }

    while written < input.len() {
        let Some(mapping) = inode.extents.map(pos) else {
            // 现有 extent 都写满了
            if let Err(e) = grow(data, allocator, inode) {
                log::error!("write: failed to allocate additional extent: {}", e);
                finish(inode, written);
                return Err(WriteFailure::new(written, e));
            }
            continue;
        };

        let n = ((input.len() - written) as u64).min(mapping.available) as usize;
        match data.bytes_mut(mapping.physical, n) {
            Ok(dst) => dst.copy_from_slice(&input[written..written + n]),
            Err(e) => {
                finish(inode, written);
                return Err(WriteFailure::new(written, e));
            }
        }
        pos += n as u64;
        written += n;
        inode.size = inode.size.max(pos);
    }

    finish(inode, written);
    Ok(written)
}

fn grow(data: &mut DataArea, allocator: &mut Allocator, inode: &mut OnDiskInode) -> Result<()> {
    let extent = allocator.allocate_extent(1, inode)?;
    data.zero_extent(&extent)
}

fn finish(inode: &mut OnDiskInode, written: usize) {
    if written > 0 {
        inode.touch();
    }
}

/// 读出整个文件
pub fn read_all(data: &DataArea, inode: &OnDiskInode) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; inode.size as usize];
    let n = read(data, inode, 0, &mut buf)?;
    if n != buf.len() {
        return Err(FsError::IoFault(format!(
            "inode {}: size {} but only {} bytes mapped",
            inode.ino, inode.size, n
        )));
    }
    Ok(buf)
}
