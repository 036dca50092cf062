//! Line-oriented command surface on stdin.
//!
//! Each line is parsed into a [`Command`] and forwarded to the main event
//! loop. Unparseable lines are reported and otherwise ignored. Guarded
//! commands (`send`, `seed`, `reset-chain`) arm on first entry and run when
//! repeated inside the arm window.
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::event::ClientEvent;
use crate::views::View;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    View(View),
    Send { address: String, amount: String },
    Seed,
    ResetChain,
    Disarm,
    Unlock(String),
    Lock,
    Mining(bool),
    Threads(u32),
    /// Lists saved contacts, optionally filtered.
    Contacts(Option<String>),
    ContactAdd { name: String, address: String },
    /// Zero-based index.
    ContactRename { index: usize, name: String },
    ContactRemove(usize),
    /// Clears a blocked daemon and tries to start it again.
    Retry,
    Status,
    Quit,
}

pub const HELP: &str = "commands: view <name> | send <address|contact> <amount> | seed | \
reset-chain | disarm | unlock <password> | lock | mining start|stop | threads <n> | \
contacts [filter] | contact add <name> <address> | contact rename <n> <name> | contact rm <n> | \
retry | status | quit";

pub fn parse_command(line: &str) -> Result<Command, ClientError> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Err(ClientError::Validation("Empty command".to_string()));
    };
    let args: Vec<&str> = parts.collect();
    let usage = |u: &str| ClientError::Validation(format!("usage: {u}"));

    match (verb.to_lowercase().as_str(), args.as_slice()) {
        ("view", [name]) => Ok(Command::View(name.parse()?)),
        ("view", _) => Err(usage("view <name>")),
        ("send", [address, amount]) => Ok(Command::Send {
            address: address.to_string(),
            amount: amount.to_string(),
        }),
        ("send", _) => Err(usage("send <address> <amount>")),
        ("seed", []) => Ok(Command::Seed),
        ("reset-chain", []) => Ok(Command::ResetChain),
        ("disarm", []) => Ok(Command::Disarm),
        // Passwords may contain spaces.
        ("unlock", [_, ..]) => Ok(Command::Unlock(args.join(" "))),
        ("unlock", []) => Err(usage("unlock <password>")),
        ("lock", []) => Ok(Command::Lock),
        ("mining", ["start"]) => Ok(Command::Mining(true)),
        ("mining", ["stop"]) => Ok(Command::Mining(false)),
        ("mining", _) => Err(usage("mining start|stop")),
        ("threads", [n]) => n
            .parse()
            .map(Command::Threads)
            .map_err(|_| usage("threads <n>")),
        ("contacts", []) => Ok(Command::Contacts(None)),
        ("contacts", filter) => Ok(Command::Contacts(Some(filter.join(" ")))),
        ("contact", ["add", rest @ .., address]) if !rest.is_empty() => Ok(Command::ContactAdd {
            name: rest.join(" "),
            address: address.to_string(),
        }),
        ("contact", ["rename", n, rest @ ..]) if !rest.is_empty() => Ok(Command::ContactRename {
            index: contact_index(n)?,
            name: rest.join(" "),
        }),
        ("contact", ["rm", n]) => Ok(Command::ContactRemove(contact_index(n)?)),
        ("contact", _) => Err(usage(
            "contact add <name> <address> | contact rename <n> <name> | contact rm <n>",
        )),
        ("retry", []) => Ok(Command::Retry),
        ("status", []) => Ok(Command::Status),
        ("quit" | "exit", []) => Ok(Command::Quit),
        _ => Err(ClientError::Validation(format!("Unknown command: {}", line.trim()))),
    }
}

/// Contacts are numbered from 1 on screen.
fn contact_index(text: &str) -> Result<usize, ClientError> {
    match text.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(ClientError::Validation(format!("Not a contact number: {text}"))),
    }
}

/// Reads stdin until EOF, forwarding parsed commands.
pub async fn run(tx: mpsc::Sender<ClientEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match parse_command(&line) {
                Ok(cmd) => {
                    if tx.send(ClientEvent::Command(cmd)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                    println!("{HELP}");
                }
            },
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(e) => {
                warn!("failed to read stdin: {e}");
                break;
            }
        }
    }
}
