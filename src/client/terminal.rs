use crate::cli::ChatArgs;
use crate::client::store::{ChatSession, ConversationStore, JsonFileStore};
use crate::client::{ChatClient, SubmitEvent};
use log::info;
use std::error::Error;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const TYPING_MARKER: &str = "... ";

#[derive(Debug, PartialEq, Eq)]
pub enum TerminalCommand {
    New,
    List,
    Switch(usize),
    Quit,
    Send(String),
    Unknown(String),
}

pub fn parse_command(line: &str) -> TerminalCommand {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return TerminalCommand::Send(line.to_string());
    };

    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("new"), None) => TerminalCommand::New,
        (Some("list"), None) => TerminalCommand::List,
        (Some("quit") | Some("exit"), None) => TerminalCommand::Quit,
        (Some("switch"), Some(n)) => match n.parse::<usize>() {
            Ok(index) if index > 0 => TerminalCommand::Switch(index),
            _ => TerminalCommand::Unknown(trimmed.to_string()),
        },
        _ => TerminalCommand::Unknown(trimmed.to_string()),
    }
}

fn print_conversations<S: ConversationStore>(session: &ChatSession<S>) {
    for (i, chat) in session.conversations().iter().enumerate() {
        let marker = if Some(chat.id.as_str()) == session.current_id() { "*" } else { " " };
        println!("{} {}. {} ({} messages)", marker, i + 1, chat.name, chat.messages.len());
    }
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let store = JsonFileStore::new(&args.store_path);
    info!("Chats are stored in {}", store.path().display());
    let mut session = ChatSession::open(store)?;
    if session.current().is_none() {
        session.create_conversation()?;
    }

    let client = ChatClient::new(args.relay_url.clone());
    println!("Connected to {}. Commands: /new, /list, /switch <n>, /quit", args.relay_url);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            TerminalCommand::Quit => break,
            TerminalCommand::New => {
                session.create_conversation()?;
                print_conversations(&session);
            }
            TerminalCommand::List => print_conversations(&session),
            TerminalCommand::Switch(index) => {
                let id = session.conversations().get(index - 1).map(|c| c.id.clone());
                match id {
                    Some(id) => {
                        session.select(&id)?;
                        if let Some(chat) = session.current() {
                            println!("Switched to {}", chat.name);
                        }
                    }
                    None => eprintln!("No conversation #{}", index),
                }
            }
            TerminalCommand::Unknown(cmd) => eprintln!("Unknown command: {}", cmd),
            TerminalCommand::Send(input) => {
                let result = client
                    .submit(&mut session, &input, |event| {
                        match event {
                            SubmitEvent::Typing(true) => print!("{}", TYPING_MARKER),
                            SubmitEvent::Typing(false) => println!(),
                            SubmitEvent::Fragment(fragment) => print!("{}", fragment),
                        }
                        let _ = std::io::stdout().flush();
                    })
                    .await;
                if let Err(e) = result {
                    eprintln!("! {}", e);
                }
            }
        }
    }

    Ok(())
}
