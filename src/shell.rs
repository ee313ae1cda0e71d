//! The command language: a line is split on whitespace into a command name
//! and positional arguments, then dispatched to a handler that turns the
//! current snapshot into output text and the next snapshot.

use tracing::debug;

mod commands;
pub mod format;

use crate::fs::{FileSystem, FsError};

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub command: &'a str,
    pub args: Vec<&'a str>,
}

pub fn parse(line: &str) -> Invocation<'_> {
    let mut tokens = line.split_whitespace();
    Invocation {
        command: tokens.next().unwrap_or(""),
        args: tokens.collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pwd,
    Ls,
    Cd,
    Mkdir,
    Touch,
    Write,
    Cat,
    Rm,
    Mv,
    Chmod,
    Su,
    Whoami,
    Df,
    Clear,
    Help,
}

impl Command {
    pub const ALL: [Command; 15] = [
        Command::Pwd,
        Command::Ls,
        Command::Cd,
        Command::Mkdir,
        Command::Touch,
        Command::Write,
        Command::Cat,
        Command::Rm,
        Command::Mv,
        Command::Chmod,
        Command::Su,
        Command::Whoami,
        Command::Df,
        Command::Clear,
        Command::Help,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Pwd => "pwd",
            Command::Ls => "ls",
            Command::Cd => "cd",
            Command::Mkdir => "mkdir",
            Command::Touch => "touch",
            Command::Write => "write",
            Command::Cat => "cat",
            Command::Rm => "rm",
            Command::Mv => "mv",
            Command::Chmod => "chmod",
            Command::Su => "su",
            Command::Whoami => "whoami",
            Command::Df => "df",
            Command::Clear => "clear",
            Command::Help => "help",
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            Command::Pwd => "pwd",
            Command::Ls => "ls [path]",
            Command::Cd => "cd [path]",
            Command::Mkdir => "mkdir <name>...",
            Command::Touch => "touch <name>...",
            Command::Write => "write <name> <text>...",
            Command::Cat => "cat <path>",
            Command::Rm => "rm [-r|-rf] <path>...",
            Command::Mv => "mv <path> <directory>",
            Command::Chmod => "chmod <user> <rwx> <path>",
            Command::Su => "su <user>",
            Command::Whoami => "whoami",
            Command::Df => "df",
            Command::Clear => "clear",
            Command::Help => "help",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Command::Pwd => "print the current directory",
            Command::Ls => "list a directory",
            Command::Cd => "change directory",
            Command::Mkdir => "create directories",
            Command::Touch => "create empty files",
            Command::Write => "create a file with the given text",
            Command::Cat => "print a file",
            Command::Rm => "remove files or directories",
            Command::Mv => "move a node into a directory",
            Command::Chmod => "set a user's permissions on a node",
            Command::Su => "switch the current user",
            Command::Whoami => "print the current user",
            Command::Df => "show block usage",
            Command::Clear => "clear the history",
            Command::Help => "show this help",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }
}

/// What a command produced: text for the terminal and the snapshot to use
/// from now on. On failure `fs` is the snapshot the command started from.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub output: String,
    pub fs: FileSystem,
    /// Set by `clear`; the terminal drops its history.
    pub clear_history: bool,
}

impl Outcome {
    pub fn new(output: impl Into<String>, fs: FileSystem) -> Self {
        Self {
            output: output.into(),
            fs,
            clear_history: false,
        }
    }

    pub(crate) fn failure(fs: &FileSystem, command: Command, error: FsError) -> Self {
        Self::new(format!("{}: {error}", command.name()), fs.clone())
    }
}

/// Runs one command line against `fs`.
pub fn execute(fs: &FileSystem, line: &str) -> Outcome {
    let invocation = parse(line);
    if invocation.command.is_empty() {
        return Outcome::new("", fs.clone());
    }
    let Some(command) = Command::from_name(invocation.command) else {
        return Outcome::new(
            FsError::UnknownCommand(invocation.command.to_owned()).to_string(),
            fs.clone(),
        );
    };
    debug!("Dispatching {} {:?}", command.name(), invocation.args);
    commands::run(command, fs, &invocation.args)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub input: String,
    pub output: String,
}

/// A terminal: the latest snapshot plus the lines typed so far.
#[derive(Debug, Clone)]
pub struct Session {
    fs: FileSystem,
    history: Vec<HistoryEntry>,
}

impl Session {
    pub fn new(fs: FileSystem) -> Self {
        Self {
            fs,
            history: Vec::new(),
        }
    }

    /// Executes `line`, records it and returns its output.
    pub fn submit(&mut self, line: &str) -> String {
        let outcome = execute(&self.fs, line);
        self.fs = outcome.fs;
        if outcome.clear_history {
            self.history.clear();
        } else {
            self.history.push(HistoryEntry {
                input: line.to_owned(),
                output: outcome.output.clone(),
            });
        }
        outcome.output
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn prompt(&self) -> String {
        let user = self
            .fs
            .user(self.fs.current_user())
            .map(|u| u.username.as_str())
            .unwrap_or("?");
        let cwd = self
            .fs
            .absolute_path(self.fs.current_directory())
            .unwrap_or_else(|_| "?".to_owned());
        format!("{user}@simfs:{cwd}$ ")
    }

    pub fn into_fs(self) -> FileSystem {
        self.fs
    }
}
