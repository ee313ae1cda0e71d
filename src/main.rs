use clap::{Args, Parser, Subcommand};
use eyre::{Context, Result};
use simfs::{fs::storage::AllocationStrategy, Config, FileSystem, Session};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::trace;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
    /// Print the final snapshot as JSON when done
    #[arg(long, global = true)]
    dump: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args)]
struct EngineArgs {
    /// JSON config file
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,
    #[arg(short = 'b', long, global = true)]
    block_size: Option<usize>,
    #[arg(short = 'n', long, global = true)]
    total_blocks: Option<usize>,
    /// contiguous, linked or indexed
    #[arg(short = 's', long, global = true)]
    strategy: Option<AllocationStrategy>,
    /// Extra non-admin user; repeatable
    #[arg(short = 'u', long = "user", global = true)]
    users: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive shell on stdin (the default)
    Shell,
    /// Run the given command lines in order
    Exec {
        #[arg(required = true)]
        lines: Vec<String>,
    },
    /// Run a file of command lines
    Script {
        #[arg(index = 1)]
        path: PathBuf,
    },
}

impl EngineArgs {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(total_blocks) = self.total_blocks {
            config.total_blocks = total_blocks;
        }
        if let Some(strategy) = self.strategy {
            config.allocation_strategy = strategy;
        }
        config
            .users
            .extend(self.users.iter().map(|username| simfs::config::UserSpec {
                username: username.clone(),
                admin: false,
            }));
        config.validate()?;
        Ok(config)
    }
}

fn run_lines<'a>(session: &mut Session, lines: impl IntoIterator<Item = &'a str>) {
    for line in lines {
        let output = session.submit(line);
        if !output.is_empty() {
            println!("{output}");
        }
    }
}

fn interactive(session: &mut Session) -> Result<()> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        print!("{}", session.prompt());
        std::io::stdout().flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed == "exit" {
            return Ok(());
        }
        let output = session.submit(trimmed);
        if trimmed == "clear" {
            // ANSI: clear screen and home the cursor.
            print!("\x1b[2J\x1b[H");
        } else if !output.is_empty() {
            println!("{output}");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();
    trace!("Starting up simfs cli");

    let config = cli.engine.config().wrap_err("Invalid configuration")?;
    let fs = FileSystem::new(&config).wrap_err("Failed to initialize filesystem")?;
    let mut session = Session::new(fs);

    match cli.command.unwrap_or(Command::Shell) {
        Command::Shell => interactive(&mut session)?,
        Command::Exec { lines } => run_lines(&mut session, lines.iter().map(String::as_str)),
        Command::Script { path } => {
            let script = std::fs::read_to_string(&path)
                .wrap_err_with(|| format!("Couldn't read script {path:?}"))?;
            run_lines(&mut session, script.lines());
        }
    }

    if cli.dump {
        let json = serde_json::to_string_pretty(&session.into_fs())?;
        println!("{json}");
    }
    Ok(())
}
