use std::{path::Path, sync::mpsc::Sender};

use crate::{
    disk::file_disk::FileDisk,
    fs::{config::FormatOptions, error::Result, super_block::SuperBlock, FileSystem},
};

/// 启动过程中发给界面的进度消息
pub enum BootProgress {
    Step(&'static str),
    Progress(u64),
    Finished(Result<FileSystem<FileDisk>>),
}

/// 打开磁盘镜像并挂载；镜像是新建的或 `force_format` 时先格式化
pub fn perform_disk_initialization(
    path: &Path,
    opts: FormatOptions,
    force_format: bool,
    tx: Sender<BootProgress>,
) {
    let _ = tx.send(BootProgress::Step("🧠 Initializing virtual disk..."));

    let disk_exists = path.exists();
    let total_blocks = SuperBlock::new(&opts).total_disk_blocks();

    // 初始化 FileDisk
    let disk = match FileDisk::open(path, total_blocks, &tx) {
        Ok(d) => d,
        Err(e) => {
            let _ = tx.send(BootProgress::Finished(Err(e.into())));
            return;
        }
    };

    let result = if !disk_exists || force_format {
        // 只有"明确是新磁盘"或用户要求时才格式化
        let _ = tx.send(BootProgress::Step("🔧 Formatting new file system..."));
        log::info!("formatting {}", path.display());
        FileSystem::format(disk, &opts)
    } else {
        let _ = tx.send(BootProgress::Step("⚙️  Mounting file system..."));
        FileSystem::mount(disk)
    };

    let _ = tx.send(BootProgress::Progress(100));
    let _ = tx.send(BootProgress::Finished(result));
}
