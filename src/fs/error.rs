use std::fmt;

/// 文件系统错误类型
#[derive(Debug)]
pub enum FsError {
    Io(std::io::Error),        // 底层 I/O 错误
    NoSpace,                   // 空闲块/inode 用尽，或找不到足够长的连续空闲块
    NoExtentSlots,             // inode 的 4 个 extent 槽位已满
    NameTooLong(String),       // 文件名超过记录容量
    InvalidName(String),       // 空文件名，或含有 \0、'/'
    UnsupportedType(u16),      // mode 既不是目录、普通文件也不是符号链接
    IoFault(String),           // 内部不变量被破坏
    NotFound(String),          // 文件或目录不存在，带路径
    AlreadyExists(String),     // 文件或目录已存在，带路径
    NotADirectory(String),     // 期望目录，实际不是
    IsADirectory(String),      // 期望文件，实际是目录
    DirectoryNotEmpty(String), // 目录非空
    InvalidInode(u32),         // inode 无效
    Corrupted(String),         // 文件系统损坏
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        FsError::Io(e)
    }
}

impl From<bincode::Error> for FsError {
    fn from(e: bincode::Error) -> Self {
        FsError::Corrupted(format!("record encoding: {}", e))
    }
}

// 实现 Display trait，用于打印错误信息
impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Disk I/O error: {}", e),
            Self::NoSpace => write!(f, "No space left on volume"),
            Self::NoExtentSlots => write!(f, "All extent slots of the inode are in use"),
            Self::NameTooLong(name) => write!(f, "File name too long: {}", name),
            Self::InvalidName(name) => write!(f, "Invalid file name: {:?}", name),
            Self::UnsupportedType(mode) => write!(f, "Unsupported file type in mode {:#o}", mode),
            Self::IoFault(desc) => write!(f, "Internal I/O fault: {}", desc),
            Self::NotFound(path) => write!(f, "File or directory not found: {}", path),
            Self::AlreadyExists(path) => write!(f, "File or directory already exists: {}", path),
            Self::NotADirectory(path) => write!(f, "Expected a directory, found a file: {}", path),
            Self::IsADirectory(path) => write!(f, "Expected a file, found a directory: {}", path),
            Self::DirectoryNotEmpty(path) => write!(f, "Directory is not empty: {}", path),
            Self::InvalidInode(inode) => write!(f, "Invalid inode: {}", inode),
            Self::Corrupted(desc) => write!(f, "File system corrupted: {}", desc),
        }
    }
}

// 支持链式错误，方便追踪底层原因
impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// 文件系统统一结果类型
pub type Result<T> = std::result::Result<T, FsError>;

/// 写入中途失败。已经拷贝进去的字节不会回滚，`written` 即成功写入的前缀长度。
#[derive(Debug)]
pub struct WriteFailure {
    pub written: usize,
    pub error: FsError,
}

impl WriteFailure {
    pub fn new(written: usize, error: FsError) -> Self {
        Self { written, error }
    }
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} bytes written)", self.error, self.written)
    }
}

impl std::error::Error for WriteFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<WriteFailure> for FsError {
    fn from(e: WriteFailure) -> Self {
        e.error
    }
}
