/// 每个逻辑块（Block）的大小：4KB
/// 所有分配都以块为最小单位。
pub const BLOCK_SIZE: usize = 4096;

/// 定义一个逻辑块类型（每块 4KB 的字节数组）
/// 所有磁盘读写都以 Block 为单位进行。
pub type Block = [u8; BLOCK_SIZE];

/// 容纳 `bytes` 字节需要的块数
pub const fn blocks_for(bytes: u64) -> u64 {
    (bytes + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64
}

/// 容纳 `bits` 个位需要的块数（位图用）
pub const fn blocks_for_bits(bits: u64) -> u64 {
    blocks_for((bits + 7) / 8)
}
