//! Terminal front-end for the user directory.

use call_signaling::PeerId;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::directory::UserDirectory;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("`call` needs a user id or list number")]
    MissingTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    Index(usize),
    User(PeerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Call(CallTarget),
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(CommandError::Empty)?;
        match verb.to_ascii_lowercase().as_str() {
            "list" | "ls" => Ok(Self::List),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            "call" => {
                let target = words.next().ok_or(CommandError::MissingTarget)?;
                Ok(Self::Call(match target.parse::<usize>() {
                    Ok(index) => CallTarget::Index(index),
                    Err(_) => CallTarget::User(PeerId::new(target)),
                }))
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

const HELP: &str = "commands: list | call <id|number> | quit";

/// Renders the directory plus the talking-with label.
pub fn render_directory(directory: &UserDirectory) -> Vec<String> {
    let mut lines = directory.render();
    if lines.is_empty() {
        lines.push("No users online".to_string());
    }
    if let Some(label) = directory.talking_with_label() {
        lines.push(label);
    }
    lines
}

/// Applies one command to the directory. `None` means the user asked to quit.
pub fn apply(command: ConsoleCommand, directory: &UserDirectory) -> Option<Vec<String>> {
    match command {
        ConsoleCommand::Quit => None,
        ConsoleCommand::Help => Some(vec![HELP.to_string()]),
        ConsoleCommand::List => Some(render_directory(directory)),
        ConsoleCommand::Call(target) => {
            let picked = match target {
                CallTarget::Index(index) => directory.select_index(index),
                CallTarget::User(user) => directory.select(&user).map(|()| user),
            };
            Some(match picked {
                Ok(user) => vec![format!("Calling {user}")],
                Err(err) => vec![err.to_string()],
            })
        }
    }
}

/// Reads commands line by line until `quit` or end of input.
pub async fn run<R, W>(input: R, mut output: W, directory: UserDirectory) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    write_lines(&mut output, &[HELP.to_string()]).await?;
    while let Some(line) = lines.next_line().await? {
        let reply = match ConsoleCommand::parse(&line) {
            Ok(command) => match apply(command, &directory) {
                Some(reply) => reply,
                None => break,
            },
            Err(CommandError::Empty) => continue,
            Err(err) => vec![err.to_string(), HELP.to_string()],
        };
        write_lines(&mut output, &reply).await?;
    }
    debug!(target = "call", "console closed");
    Ok(())
}

async fn write_lines<W: AsyncWrite + Unpin>(output: &mut W, lines: &[String]) -> std::io::Result<()> {
    for line in lines {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }
    output.flush().await
}
