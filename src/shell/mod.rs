pub mod command;
pub mod parse;

use crate::{
    shell::{
        command::{execute_command, Command, Session},
        parse::parse_command,
    },
    Cli,
};
use colored::*;
use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use extent_fs::{
    disk::init::{perform_disk_initialization, BootProgress},
    FileDisk, FileSystem, FormatOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use reedline::{
    DefaultCompleter, DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal,
};
use std::{io::stdout, path::PathBuf, sync::mpsc, thread};

const COMMANDS: [&str; 17] = [
    "help", "ls", "pwd", "mkdir", "rmdir", "create", "rm", "cd", "read", "write", "append",
    "stat", "df", "fsck", "format", "exit", "quit",
];

pub fn start_shell(cli: &Cli) {
    let opts = FormatOptions::new(cli.blocks, cli.inodes);
    let Some(fs) = boot(cli, opts) else {
        return;
    };
    let mut session = Session::new(fs, opts);

    let username = whoami::username();
    let hostname = whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string());

    println!(
        "{}",
        "Type 'help' for available commands. Use ↑↓ for history, Tab for auto-completion.\n"
            .bright_black()
    );

    // 初始化 reedline
    let history_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".extent_fs_history");

    let mut line_editor = Reedline::create();
    match FileBackedHistory::with_file(100, history_path) {
        Ok(history) => line_editor = line_editor.with_history(Box::new(history)),
        Err(e) => log::warn!("command history disabled: {}", e),
    }

    // 命令补全
    let completer = DefaultCompleter::new_with_wordlen(
        COMMANDS.iter().map(|s| s.to_string()).collect(),
        2,
    );
    line_editor = line_editor.with_completer(Box::new(completer));

    loop {
        let left = format!(
            "{}:{}",
            format!("{}@{}", username, hostname).green(),
            session.pwd().blue()
        );
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic(left),
            DefaultPromptSegment::Basic("extent-fs".bright_blue().bold().to_string()),
        );

        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                let trimmed = buffer.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match parse_command(trimmed) {
                    Some(cmd) => {
                        if let Err(e) = execute_command(&cmd, &mut session) {
                            println!("{} {}", "❌ Error:".red().bold(), e);
                        }
                        if matches!(cmd, Command::Exit) {
                            break;
                        }
                    }
                    None => println!(
                        "{}",
                        "⚠️  Unknown command or missing argument. Type 'help' for command list."
                            .yellow()
                    ),
                }
            }
            Ok(Signal::CtrlC) => {
                println!();
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("{}", "Exiting extent-fs...".yellow());
                if let Err(e) = session.fs.sync() {
                    println!("{} {}", "❌ Error:".red().bold(), e);
                }
                break;
            }
            #[allow(unreachable_patterns)]
            Ok(_) => continue,
            Err(e) => {
                println!("Error reading line: {}", e);
                break;
            }
        }
    }

    println!("{}", "GoodBye!".bright_yellow());
}

/// 在后台线程里打开/格式化镜像，前台用进度条显示各步骤
fn boot(cli: &Cli, opts: FormatOptions) -> Option<FileSystem<FileDisk>> {
    let mut stdout = stdout();
    let _ = execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0));
    println!("{}", "[extent-fs Booting...]".bright_yellow().bold());

    let (tx, rx) = mpsc::channel();
    let path = cli.disk.clone();
    let force_format = cli.format;
    let worker = thread::spawn(move || perform_disk_initialization(&path, opts, force_format, tx));

    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos:>3}% {msg}") {
        pb.set_style(style.progress_chars("=> "));
    }

    let mut mounted = None;
    for msg in rx {
        match msg {
            BootProgress::Step(step) => pb.println(step),
            BootProgress::Progress(pos) => pb.set_position(pos),
            BootProgress::Finished(Ok(fs)) => {
                pb.finish_with_message("✅ Ready!");
                mounted = Some(fs);
            }
            BootProgress::Finished(Err(e)) => {
                pb.abandon_with_message("❌ Boot failed");
                println!(
                    "{} {}: {}",
                    "❌ Cannot open".red().bold(),
                    cli.disk.display(),
                    e
                );
                log::error!("boot failed: {}", e);
            }
        }
    }
    if worker.join().is_err() {
        println!("{}", "❌ Disk initialization thread panicked".red().bold());
        return None;
    }

    let fs = mounted?;
    let _ = execute!(
        stdout,
        Clear(ClearType::All),
        cursor::MoveTo(0, 0),
        SetForegroundColor(Color::Cyan),
        Print(format!(
            "Welcome to extent-fs v{} (volume {})\n",
            env!("CARGO_PKG_VERSION"),
            fs.super_block.volume_uuid()
        )),
        ResetColor
    );
    Some(fs)
}
