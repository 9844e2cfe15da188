use std::io::Result;

use crate::disk::types::Block;

/// 以块为单位读写的设备。块号是设备上的绝对块号。
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()>;
    fn write_block(&self, block_id: u64, buf: &Block) -> Result<()>;
    /// 设备总块数
    fn block_count(&self) -> u64;
}
