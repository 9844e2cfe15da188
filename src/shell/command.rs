use colored::*;
use dialoguer::Confirm;
use extent_fs::{
    fs::{
        fsck,
        inode_table::{InodeType, Owner, Permissions, S_IFDIR, S_IFREG},
    },
    utils::format_timestamp,
    FileDisk, FileSystem, FormatOptions, FsError,
};
use std::error::Error;

#[derive(Debug)]
pub enum Command {
    Help,
    Ls,
    Pwd,
    Mkdir(String),
    Rmdir(String),
    Create(String),
    Rm(String),
    Cd(String),
    Read(String),
    Write(String, String),
    Append(String, String),
    Stat(String),
    Df,
    Fsck,
    Format,
    Exit,
}

impl Command {
    /// 会改动卷内容、执行后需要落盘的命令
    fn mutates(&self) -> bool {
        matches!(
            self,
            Command::Mkdir(_)
                | Command::Rmdir(_)
                | Command::Create(_)
                | Command::Rm(_)
                | Command::Write(..)
                | Command::Append(..)
        )
    }
}

/// 外壳会话：挂载好的卷 + 当前目录
pub struct Session {
    pub fs: FileSystem<FileDisk>,
    /// 从根开始的 (名字, inode) 路径栈，空表示在根目录
    pub path: Vec<(String, u32)>,
    pub format_opts: FormatOptions,
}

impl Session {
    pub fn new(fs: FileSystem<FileDisk>, format_opts: FormatOptions) -> Self {
        Self {
            fs,
            path: Vec::new(),
            format_opts,
        }
    }

    pub fn cwd(&self) -> u32 {
        self.path
            .last()
            .map_or_else(|| self.fs.root_ino(), |&(_, ino)| ino)
    }

    pub fn pwd(&self) -> String {
        if self.path.is_empty() {
            return "/".to_string();
        }
        self.path
            .iter()
            .map(|(name, _)| format!("/{}", name))
            .collect()
    }

    fn resolve(&self, name: &str) -> Result<u32, FsError> {
        self.fs
            .lookup(self.cwd(), name)?
            .ok_or_else(|| FsError::NotFound(self.child_path(name)))
    }

    fn child_path(&self, name: &str) -> String {
        match self.pwd().as_str() {
            "/" => format!("/{}", name),
            dir => format!("{}/{}", dir, name),
        }
    }

    fn kind_of(&self, ino: u32) -> Option<InodeType> {
        self.fs.get_inode_record(ino).and_then(|i| i.inode_type())
    }
}

pub fn execute_command(cmd: &Command, session: &mut Session) -> Result<(), Box<dyn Error>> {
    match cmd {
        Command::Help => print_help(),
        Command::Ls => list(session)?,
        Command::Pwd => println!("📍 {}", session.pwd().cyan()),
        Command::Mkdir(name) => {
            session.fs.create(
                session.cwd(),
                name,
                S_IFDIR | Permissions::DIR_DEFAULT.bits(),
                Owner::default(),
            )?;
            println!("✅ Created directory: {}", session.child_path(name).green());
        }
        Command::Rmdir(name) => {
            let ino = session.resolve(name)?;
            if session.kind_of(ino) != Some(InodeType::Directory) {
                return Err(FsError::NotADirectory(session.child_path(name)).into());
            }
            session.fs.remove(session.cwd(), name)?;
            println!("🗑️ Removed directory: {}", session.child_path(name).red());
        }
        Command::Create(name) => {
            session.fs.create(
                session.cwd(),
                name,
                S_IFREG | Permissions::FILE_DEFAULT.bits(),
                Owner::default(),
            )?;
            println!("📝 Created file: {}", session.child_path(name).green());
        }
        Command::Rm(name) => {
            let ino = session.resolve(name)?;
            if session.kind_of(ino) == Some(InodeType::Directory) {
                return Err(FsError::IsADirectory(session.child_path(name)).into());
            }
            session.fs.remove(session.cwd(), name)?;
            println!("❌ Deleted file: {}", session.child_path(name).red());
        }
        Command::Cd(path) => change_dir(session, path)?,
        Command::Read(file) => {
            let ino = session.resolve(file)?;
            let content = session.fs.read_all(ino)?;
            println!(
                "📖 {} ({} bytes)",
                session.child_path(file).cyan(),
                content.len()
            );
            println!("{}", String::from_utf8_lossy(&content));
        }
        Command::Write(file, content) => write_file(session, file, content, false)?,
        Command::Append(file, content) => write_file(session, file, content, true)?,
        Command::Stat(file) => stat(session, file)?,
        Command::Df => {
            let fs = &session.fs;
            let alloc = &fs.allocator;
            println!("{}", "💽 Volume".bright_yellow().bold());
            println!("{}: {}", "UUID".blue(), fs.super_block.volume_uuid());
            println!(
                "{}: {}",
                "Created".blue(),
                format_timestamp(fs.super_block.created)
            );
            println!("{}: {} bytes", "Block size".blue(), fs.super_block.block_size);
            println!(
                "{}: {} free / {} total",
                "Blocks".blue(),
                alloc.nr_free_blocks(),
                alloc.block_count()
            );
            println!(
                "{}: {} free / {} total",
                "Inodes".blue(),
                alloc.nr_free_inodes(),
                alloc.inode_count()
            );
        }
        Command::Fsck => {
            let report = fsck::check(&session.fs);
            if report.is_clean() {
                print!("{} ", "✅ Clean:".green().bold());
            } else {
                print!("{} ", "⚠️  Problems:".yellow().bold());
            }
            print!("{}", report);
        }
        Command::Format => {
            let confirmed = Confirm::new()
                .with_prompt("Erase every file on this volume?")
                .default(false)
                .interact()?;
            if !confirmed {
                println!("{}", "Format cancelled.".bright_black());
                return Ok(());
            }
            let opts = session.format_opts;
            session.fs.reformat(&opts)?;
            session.path.clear();
            println!(
                "{} {}",
                "✅ Disk formatted successfully! Volume".green(),
                session.fs.super_block.volume_uuid()
            );
        }
        Command::Exit => {
            session.fs.sync()?;
            println!("{}", "👋 Exiting extent-fs shell...".yellow().bold());
        }
    }

    if cmd.mutates() {
        session.fs.sync()?;
    }
    Ok(())
}

fn list(session: &Session) -> Result<(), FsError> {
    let fs = &session.fs;
    println!("📂  .");
    if !session.path.is_empty() {
        println!("📁  ..");
    }
    for item in fs.iterate(session.cwd(), 0)? {
        let (name, ino) = item?;
        match fs.get_inode_record(ino) {
            Some(inode) if inode.is_dir() => println!("📁  {}", name.blue()),
            Some(inode) => println!(
                "📄  {} {}",
                name,
                format!("({} bytes)", inode.size).bright_black()
            ),
            None => println!("❓  {} {}", name, format!("(inode {})", ino).red()),
        }
    }
    Ok(())
}

fn change_dir(session: &mut Session, path: &str) -> Result<(), FsError> {
    match path {
        "/" => session.path.clear(),
        "." => {}
        ".." => {
            session.path.pop();
        }
        name => {
            let ino = session.resolve(name)?;
            if session.kind_of(ino) != Some(InodeType::Directory) {
                return Err(FsError::NotADirectory(session.child_path(name)));
            }
            session.path.push((name.to_string(), ino));
        }
    }
    println!("📂 Moved to {}", session.pwd().blue());
    Ok(())
}

/// 写入字符串；`append` 时从文件末尾开始，否则从 0 覆盖
fn write_file(
    session: &mut Session,
    file: &str,
    content: &str,
    append: bool,
) -> Result<(), FsError> {
    let ino = match session.fs.lookup(session.cwd(), file)? {
        Some(ino) => ino,
        None => session.fs.create(
            session.cwd(),
            file,
            S_IFREG | Permissions::FILE_DEFAULT.bits(),
            Owner::default(),
        )?,
    };
    let offset = match session.fs.get_inode_record(ino) {
        Some(inode) if append => inode.size,
        _ => 0,
    };

    match session.fs.write(ino, offset, content.as_bytes()) {
        Ok(n) => {
            println!("✏️  Wrote {} bytes to {}", n, session.child_path(file).cyan());
            Ok(())
        }
        Err(failure) => {
            // 已写入的部分保留，先落盘再报错
            session.fs.sync()?;
            println!(
                "{} {} of {} bytes kept",
                "⚠️  Partial write:".yellow(),
                failure.written,
                content.len()
            );
            Err(failure.error)
        }
    }
}

fn stat(session: &Session, file: &str) -> Result<(), FsError> {
    let ino = match file {
        "." => session.cwd(),
        name => session.resolve(name)?,
    };
    let inode = session
        .fs
        .get_inode_record(ino)
        .ok_or(FsError::InvalidInode(ino))?;
    let (kind, type_char) = match inode.inode_type() {
        Some(InodeType::Directory) => ("Directory", 'd'),
        Some(InodeType::Symlink) => ("Symlink", 'l'),
        Some(InodeType::File) => ("File", '-'),
        None => ("Unknown", '?'),
    };

    println!("{}", "📊 File Info".bright_yellow().bold());
    println!("{}: {}", "Name".blue(), file);
    println!("{}: {}", "Inode".blue(), inode.ino);
    println!("{}: {}", "Type".blue(), kind);
    println!(
        "{}: {}{} ({:o})",
        "Mode".blue(),
        type_char,
        inode.permissions().to_rwx(),
        inode.permissions().bits()
    );
    println!("{}: {} / {}", "Uid/Gid".blue(), inode.uid, inode.gid);
    println!("{}: {}", "Links".blue(), inode.links);
    println!("{}: {} bytes", "Size".blue(), inode.size);
    println!("{}: {}", "Blocks".blue(), inode.blocks);
    println!("{}: {}", "Accessed".blue(), format_timestamp(inode.atime));
    println!("{}: {}", "Modified".blue(), format_timestamp(inode.mtime));
    println!("{}: {}", "Changed".blue(), format_timestamp(inode.ctime));
    println!("{}: {}", "Extents".blue(), inode.extent_count());
    for (logical, extent) in inode.extents.iter_logical() {
        println!(
            "  {}",
            format!(
                "logical {} -> blocks {}..{} ({} blocks)",
                logical,
                extent.start_block,
                extent.end_block(),
                extent.block_count
            )
            .bright_black()
        );
    }
    Ok(())
}

fn print_help() {
    println!("{}", "📘 extent-fs Commands".bright_cyan().bold());
    println!(
        "{}",
        "
  ls                    List entries in current directory
  pwd                   Print current path
  mkdir <dir>           Create directory
  rmdir <dir>           Remove empty directory
  create <file>         Create empty file
  rm <file>             Remove file and free its extents
  cd <dir>|..|/         Change directory
  read <file>           Read file content
  write <file> <str>    Write string at the start of file (creates it if missing)
  append <file> <str>   Append string to the end of file
  stat <file>           Show inode and extent info
  df                    Show free blocks and inodes
  fsck                  Check bitmaps against inode extents
  format                Erase and format the volume
  help                  Show this help message
  exit                  Quit the shell
"
        .bright_black()
    );
}
