use crate::fs::identity::{Permission, PermissionKind};
use crate::fs::node::{Node, NodeId};
use crate::fs::{FileSystem, FsError, Result};

use super::format::ls_line;
use super::{Command, Outcome};

/// Type recorded for files created from the command line.
const TEXT_TYPE: &str = "text/plain";

pub(super) fn run(command: Command, fs: &FileSystem, args: &[&str]) -> Outcome {
    let reply = match command {
        Command::Mkdir => return create_each(fs, command, args, mkdir_one),
        Command::Touch => return create_each(fs, command, args, touch_one),
        Command::Rm => return rm(fs, args),
        Command::Clear => {
            return Outcome {
                clear_history: true,
                ..Outcome::new("", fs.clone())
            }
        }
        Command::Pwd => pwd(fs).map(|out| (out, fs.clone())),
        Command::Ls => ls(fs, args).map(|out| (out, fs.clone())),
        Command::Cat => cat(fs, args).map(|out| (out, fs.clone())),
        Command::Whoami => whoami(fs).map(|out| (out, fs.clone())),
        Command::Df => Ok((df(fs), fs.clone())),
        Command::Help => Ok((help(), fs.clone())),
        Command::Cd => cd(fs, args).map(|next| (String::new(), next)),
        Command::Write => write(fs, args).map(|next| (String::new(), next)),
        Command::Mv => mv(fs, args).map(|next| (String::new(), next)),
        Command::Chmod => chmod(fs, args).map(|next| (String::new(), next)),
        Command::Su => su(fs, args).map(|next| (String::new(), next)),
    };
    match reply {
        Ok((output, next)) => Outcome::new(output, next),
        Err(error) => Outcome::failure(fs, command, error),
    }
}

fn cwd(fs: &FileSystem) -> NodeId {
    fs.current_directory()
}

fn pwd(fs: &FileSystem) -> Result<String> {
    fs.absolute_path(cwd(fs))
}

fn ls(fs: &FileSystem, args: &[&str]) -> Result<String> {
    let target = match args.first() {
        Some(path) => fs.resolve_from(cwd(fs), path)?,
        None => fs.node(cwd(fs)).ok_or(FsError::NotFound)?,
    };
    if !fs.has_permission(target.id, PermissionKind::Read) {
        return Err(FsError::PermissionDenied);
    }
    if !target.is_directory() {
        return Ok(target.name.clone());
    }
    Ok(fs
        .children_of(target.id)
        .into_iter()
        .map(|child| ls_line(fs, child))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn cd(fs: &FileSystem, args: &[&str]) -> Result<FileSystem> {
    match args.first() {
        None => Ok(fs.go_root()),
        Some(&"..") => Ok(fs.leave_directory()),
        Some(path) => {
            let target = fs.resolve_from(cwd(fs), path)?;
            fs.change_directory(target.id)
        }
    }
}

/// Splits `dir/name` into the directory to create in and the new name.
/// A bare name targets the current directory.
fn creation_target<'a>(fs: &FileSystem, arg: &'a str) -> Result<(NodeId, &'a str)> {
    let trimmed = arg.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((dir, name)) => {
            let dir = if dir.is_empty() { "/" } else { dir };
            Ok((fs.resolve_from(cwd(fs), dir)?.id, name))
        }
        None => Ok((cwd(fs), trimmed)),
    }
}

fn mkdir_one(fs: &FileSystem, arg: &str) -> Result<FileSystem> {
    let (parent, name) = creation_target(fs, arg)?;
    fs.create_directory(parent, name)
}

fn touch_one(fs: &FileSystem, arg: &str) -> Result<FileSystem> {
    let (parent, name) = creation_target(fs, arg)?;
    fs.create_file(parent, name, "", TEXT_TYPE)
}

/// Applies `create` to each argument in turn. The first failure stops the
/// run; what was created before it stays.
fn create_each(
    fs: &FileSystem,
    command: Command,
    args: &[&str],
    create: fn(&FileSystem, &str) -> Result<FileSystem>,
) -> Outcome {
    if args.is_empty() {
        return Outcome::failure(fs, command, FsError::MissingOperand);
    }
    let mut current = fs.clone();
    for arg in args {
        match create(&current, arg) {
            Ok(next) => current = next,
            Err(error) => return Outcome::failure(&current, command, error),
        }
    }
    Outcome::new("", current)
}

fn write(fs: &FileSystem, args: &[&str]) -> Result<FileSystem> {
    let (name, words) = args.split_first().ok_or(FsError::MissingOperand)?;
    let (parent, name) = creation_target(fs, name)?;
    fs.create_file(parent, name, &words.join(" "), TEXT_TYPE)
}

fn cat(fs: &FileSystem, args: &[&str]) -> Result<String> {
    let path = args.first().ok_or(FsError::MissingOperand)?;
    let node = fs.resolve_from(cwd(fs), path)?;
    let content = node.content().ok_or(FsError::IsADirectory)?;
    if !fs.has_permission(node.id, PermissionKind::Read) {
        return Err(FsError::PermissionDenied);
    }
    Ok(content.to_owned())
}

/// Tries every path, even after a failure, and reports each failure on
/// its own line.
fn rm(fs: &FileSystem, args: &[&str]) -> Outcome {
    let (recursive, paths) = match args.split_first() {
        Some((flag, rest)) if *flag == "-r" || *flag == "-rf" => (true, rest),
        _ => (false, args),
    };
    if paths.is_empty() {
        return Outcome::failure(fs, Command::Rm, FsError::MissingOperand);
    }
    let mut current = fs.clone();
    let mut errors = Vec::new();
    for path in paths {
        let removed = current
            .join_path(cwd(&current), path)
            .and_then(|absolute| current.remove_node(&absolute, recursive));
        match removed {
            Ok(next) => current = next,
            Err(FsError::Subtree(failures)) => {
                errors.extend(failures.iter().map(|failure| format!("rm: {path}: {failure}")))
            }
            Err(error) => errors.push(format!("rm: {path}: {error}")),
        }
    }
    Outcome::new(errors.join("\n"), current)
}

fn mv(fs: &FileSystem, args: &[&str]) -> Result<FileSystem> {
    let [source, dest] = args else {
        return Err(FsError::MissingOperand);
    };
    let source = fs.resolve_from(cwd(fs), source)?;
    let dest = fs.resolve_from(cwd(fs), dest)?;
    fs.move_node(source.id, dest.id)
}

fn chmod(fs: &FileSystem, args: &[&str]) -> Result<FileSystem> {
    let [user, permission, path] = args else {
        return Err(FsError::MissingOperand);
    };
    let permission: Permission = permission.parse()?;
    let node: &Node = fs.resolve_from(cwd(fs), path)?;
    fs.grant_permission(node.id, user, permission)
}

fn su(fs: &FileSystem, args: &[&str]) -> Result<FileSystem> {
    let user = args.first().ok_or(FsError::MissingOperand)?;
    fs.switch_user(user)
}

fn whoami(fs: &FileSystem) -> Result<String> {
    fs.user(fs.current_user())
        .map(|user| user.username.clone())
        .ok_or(FsError::NotFound)
}

fn df(fs: &FileSystem) -> String {
    let usage = fs.usage();
    format!(
        "Blocks  Used  Free  Block size  Strategy\n{:<6}  {:<4}  {:<4}  {:<10}  {}",
        usage.total,
        usage.used,
        usage.free,
        usage.block_size,
        fs.allocation_strategy()
    )
}

fn help() -> String {
    let mut lines = vec!["Available commands:".to_owned()];
    for command in Command::ALL {
        lines.push(format!("  {:<28}{}", command.usage(), command.summary()));
    }
    lines.join("\n")
}
