use crate::shell::command::Command;

pub fn parse_command(input: &str) -> Option<Command> {
    let tokens: Vec<&str> = input.trim().split_ascii_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    let cmd = tokens[0];
    let args = &tokens[1..];

    match cmd {
        "help" => Some(Command::Help),
        "ls" => Some(Command::Ls),
        "pwd" => Some(Command::Pwd),
        "mkdir" => args.first().map(|&name| Command::Mkdir(name.to_string())),
        "rmdir" => args.first().map(|&name| Command::Rmdir(name.to_string())),
        "create" | "touch" => args.first().map(|&name| Command::Create(name.to_string())),
        "rm" => args.first().map(|&name| Command::Rm(name.to_string())),
        "cd" => Some(Command::Cd(
            args.first().map_or_else(|| "/".to_string(), |s| s.to_string()),
        )),
        "read" | "cat" => args.first().map(|&name| Command::Read(name.to_string())),
        "write" | "append" => {
            if args.len() >= 2 {
                let file = args[0].to_string();
                let content = args[1..].join(" ");
                Some(if cmd == "write" {
                    Command::Write(file, content)
                } else {
                    Command::Append(file, content)
                })
            } else {
                None
            }
        }
        "stat" => args.first().map(|&name| Command::Stat(name.to_string())),
        "df" => Some(Command::Df),
        "fsck" => Some(Command::Fsck),
        "format" => Some(Command::Format),
        "exit" | "quit" => Some(Command::Exit),
        _ => None,
    }
}
