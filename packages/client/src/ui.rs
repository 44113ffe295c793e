//! UI utilities for the client.

use std::io::Write;

/// Redisplay the prompt after printing something
pub fn redisplay_prompt(user_id: &str, peer_id: Option<&str>) {
    print!("{}", prompt(user_id, peer_id));
    std::io::stdout().flush().ok();
}

pub fn prompt(user_id: &str, peer_id: Option<&str>) -> String {
    match peer_id {
        Some(peer_id) => format!("{} -> {}> ", user_id, peer_id),
        None => format!("{}> ", user_id),
    }
}

/// One line typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Plain text for the current peer
    Text(String),
    /// `/to <peer>`: switch the conversation partner
    SwitchPeer(String),
    /// `/image <url> [caption]`
    Image { url: String, caption: Option<String> },
    Join(String),
    Leave(String),
    /// `/typing [room]`: defaults to the conversation with the current peer
    Typing(Option<String>),
    History(Option<String>),
    Roster,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  /to <user>              talk to <user> (joins your conversation room)
  /image <url> [caption]  send an image reference
  /join <room>            join a room
  /leave <room>           leave a room
  /typing [room]          tell a room you are typing (default: current user)
  /history [user]         show history with <user> (default: current)
  /roster                 show who is online
  /help                   show this help
  /quit                   exit
Anything else is sent to the current user.
";

/// Parse a line of user input
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Text(line.to_string());
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    match (name, argument) {
        ("to", Some(peer)) => Input::SwitchPeer(peer),
        ("image", Some(rest)) => {
            let (url, caption) = match rest.split_once(char::is_whitespace) {
                Some((url, caption)) => (url.to_string(), Some(caption.trim().to_string())),
                None => (rest, None),
            };
            Input::Image { url, caption }
        }
        ("join", Some(room)) => Input::Join(room),
        ("leave", Some(room)) => Input::Leave(room),
        ("typing", room) => Input::Typing(room),
        ("history", peer) => Input::History(peer),
        ("roster", None) => Input::Roster,
        ("help", _) => Input::Help,
        ("quit" | "exit", _) => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}
