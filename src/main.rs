use std::path::PathBuf;

use clap::Parser;
use extent_fs::FormatOptions;

use crate::shell::start_shell;

mod shell;

/// 交互式的 extent 文件系统外壳
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// 磁盘镜像路径
    #[arg(long, default_value = "disk.img")]
    pub disk: PathBuf,
    /// 格式化时的数据块数
    #[arg(long, default_value_t = FormatOptions::default().block_count)]
    pub blocks: u32,
    /// 格式化时的 inode 数
    #[arg(long, default_value_t = FormatOptions::default().inode_count)]
    pub inodes: u32,
    /// 即使镜像已存在也重新格式化
    #[arg(long)]
    pub format: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    start_shell(&cli);
}
