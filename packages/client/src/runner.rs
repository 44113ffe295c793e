//! Interactive CLI session on top of `ClientHandle`.

use std::sync::{Arc, Mutex, PoisonError};

use rustyline::{DefaultEditor, error::ReadlineError};
use tayori_shared::protocol::{MessageContentDto, direct_room_id};
use tokio::sync::mpsc;

use crate::{
    formatter::MessageFormatter,
    handle::{ClientConfig, ClientHandle},
    transport::WebSocketConnector,
    ui::{HELP, Input, parse_input, redisplay_prompt},
};

/// Who we are and who we are talking to, shared with the listeners
#[derive(Clone)]
struct Prompt {
    user_id: Arc<str>,
    peer_id: Arc<Mutex<Option<String>>>,
}

impl Prompt {
    fn peer(&self) -> Option<String> {
        self.peer_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_peer(&self, peer_id: String) {
        *self.peer_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(peer_id);
    }

    fn print(&self, text: &str) {
        print!("{}", text);
        redisplay_prompt(&self.user_id, self.peer().as_deref());
    }
}

/// Run the interactive client until the user quits or the connection closes for good
pub async fn run_client(
    url: String,
    token: String,
    user_id: String,
    peer_id: Option<String>,
    config: ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = Arc::new(ClientHandle::new(
        Arc::new(WebSocketConnector::new(url.clone())),
        config,
    ));
    let prompt = Prompt {
        user_id: Arc::from(user_id.as_str()),
        peer_id: Arc::new(Mutex::new(peer_id)),
    };
    register_listeners(&client, &prompt);

    if let Some(peer_id) = prompt.peer() {
        client.join_conversation(peer_id)?;
    }

    tracing::info!("Connecting to {} as '{}'", url, user_id);
    client.connect(&token).await?;
    println!(
        "\nYou are '{}'. Type /help for commands. Press Ctrl+C to exit.\n",
        user_id
    );

    // Create channel for rustyline input
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();

    // Spawn a blocking thread for rustyline (synchronous readline)
    let readline_prompt = prompt.clone();
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            let current = crate::ui::prompt(
                &readline_prompt.user_id,
                readline_prompt.peer().as_deref(),
            );
            match rl.readline(&current) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    let mut states = client.state_changes();
    loop {
        tokio::select! {
            line = input_rx.recv() => {
                let Some(line) = line else { break };
                if !dispatch(&client, &prompt, parse_input(&line)) {
                    break;
                }
            }
            changed = states.changed() => {
                if changed.is_err() || client.state().is_terminal() {
                    break;
                }
            }
        }
    }

    // 終端エラー（リトライ上限など）はここで返る
    client.disconnect().await?;
    Ok(())
}

fn register_listeners(client: &ClientHandle, prompt: &Prompt) {
    let p = prompt.clone();
    client.on_roster_snapshot(move |entries| {
        p.print(&MessageFormatter::format_roster(entries, &p.user_id));
    });
    let p = prompt.clone();
    client.on_roster_delta(move |entry| p.print(&MessageFormatter::format_presence(entry)));
    let p = prompt.clone();
    client.on_message(move |message| p.print(&MessageFormatter::format_message(message)));
    let p = prompt.clone();
    client.on_state_change(move |state| p.print(&MessageFormatter::format_state(state)));
    let p = prompt.clone();
    client.on_typing(move |room_id, user_id| {
        p.print(&MessageFormatter::format_typing(room_id, user_id));
    });
}

/// Act on one line of input.
///
/// # Returns
///
/// `false` when the user asked to quit
fn dispatch(client: &Arc<ClientHandle>, prompt: &Prompt, input: Input) -> bool {
    let result = match input {
        Input::Quit => return false,
        Input::Help => {
            prompt.print(HELP);
            Ok(())
        }
        Input::SwitchPeer(peer_id) => {
            prompt.set_peer(peer_id.clone());
            client.join_conversation(peer_id)
        }
        Input::Text(text) => send(client, prompt, MessageContentDto::text(text)),
        Input::Image { url, caption } => send(
            client,
            prompt,
            MessageContentDto {
                text: caption,
                image: Some(url),
            },
        ),
        Input::Join(room_id) => client.join_room(room_id),
        Input::Leave(room_id) => client.leave_room(room_id),
        Input::Typing(Some(room_id)) => client.send_typing(room_id),
        Input::Typing(None) => match prompt.peer() {
            Some(peer_id) => client.send_typing(direct_room_id(&prompt.user_id, &peer_id)),
            None => {
                prompt.print("\nNo user selected; use /to <user> first\n");
                Ok(())
            }
        },
        Input::History(peer_id) => match peer_id.or_else(|| prompt.peer()) {
            Some(peer_id) => {
                let (client, prompt) = (client.clone(), prompt.clone());
                tokio::spawn(async move {
                    match client.request_history(peer_id.clone()).await {
                        Ok(messages) => {
                            prompt.print(&MessageFormatter::format_history(&peer_id, &messages))
                        }
                        Err(e) => prompt.print(&format!("\nhistory failed: {}\n", e)),
                    }
                });
                Ok(())
            }
            None => {
                prompt.print("\nNo user selected; use /to <user> first\n");
                Ok(())
            }
        },
        // スナップショットは roster listener が表示する
        Input::Roster => client.request_roster(),
        Input::Unknown(line) => {
            prompt.print(&format!("\nUnknown command: {} (try /help)\n", line));
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::warn!("{}", e);
    }
    true
}

/// Send to the current peer in the background and print the receipt when it arrives
fn send(
    client: &Arc<ClientHandle>,
    prompt: &Prompt,
    content: MessageContentDto,
) -> Result<(), crate::error::ClientError> {
    let Some(peer_id) = prompt.peer() else {
        prompt.print("\nNo user selected; use /to <user> first\n");
        return Ok(());
    };

    let envelope = ClientHandle::compose(peer_id, content);
    let (client, prompt) = (client.clone(), prompt.clone());
    tokio::spawn(async move {
        match client.send_message(envelope).await {
            Ok(receipt) => prompt.print(&MessageFormatter::format_receipt(&receipt)),
            Err(e) => prompt.print(&format!("\nsend failed: {}\n", e)),
        }
    });
    Ok(())
}
