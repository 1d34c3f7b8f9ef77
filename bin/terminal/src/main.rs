//! Terminal chat client over the in-memory backend.
//!
//! Usage: `pairchat [config.toml]`. Logging is controlled by `RUST_LOG`.

mod command;

use command::{Command, HELP};
use pairchat_backend::{MemoryDocumentStore, MemoryIdentityService};
use pairchat_client::{ChatClient, ClientConfig};
use pairchat_conversation::{ConversationState, ConversationView};
use pairchat_core::MessageId;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Client = ChatClient<MemoryIdentityService, MemoryDocumentStore>;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config =
        ClientConfig::load(config_path.as_deref()).expect("failed to load configuration");
    tracing::info!(?config, "Loaded configuration");

    let store = Arc::new(MemoryDocumentStore::new());
    let identity = Arc::new(MemoryIdentityService::with_min_password_length(
        config.identity.min_password_length,
    ));
    let client = ChatClient::new(identity, store, config);

    let _listener = client.on_identity_change(|user| match user {
        Some(user) => {
            tracing::info!(user_id = %user.id, name = %user.display_name, "identity changed");
        }
        None => tracing::info!("no user signed in"),
    });
    let printer = tokio::spawn(print_incoming(client.watch_conversation()));

    println!("pairchat. Type /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read input");
                break;
            }
        };
        match Command::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => run(&client, command).await,
            Ok(None) => {}
            Err(e) => println!("{e}"),
        }
    }

    printer.abort();
    if client.current_user().is_some() {
        if let Err(e) = client.sign_out().await {
            tracing::warn!(error = %e.current_context(), "Sign-out on exit failed");
        }
    }
}

async fn run(client: &Client, command: Command) {
    let outcome = match command {
        Command::SignUp {
            email,
            password,
            display_name,
        } => client
            .sign_up(&email, &password, &display_name)
            .await
            .map(|user| println!("Welcome, {}.", user.display_name)),
        Command::SignIn { email, password } => client
            .sign_in(&email, &password)
            .await
            .map(|user| println!("Signed in as {}.", user.display_name)),
        Command::SignOut => client.sign_out().await.map(|()| println!("Signed out.")),
        Command::Contacts => {
            let list = client.contacts().await;
            if let Some(error) = &list.error {
                println!("(contact list may be stale: {error})");
            }
            for (n, contact) in list.contacts.iter().enumerate() {
                println!("{:>3}. {} <{}>", n + 1, contact.display_name, contact.email);
            }
            Ok(())
        }
        Command::Refresh => client.refresh_contacts().await.map(|contacts| {
            println!("{} contacts.", contacts.len());
        }),
        Command::Open(n) => match client.contacts().await.contacts.into_iter().nth(n - 1) {
            Some(contact) => {
                let name = contact.display_name.clone();
                client
                    .select_contact(contact)
                    .await
                    .map(|()| println!("Chatting with {name}."))
            }
            None => {
                println!("No contact {n}. Try /contacts.");
                Ok(())
            }
        },
        Command::Close => {
            client.clear_selection().await;
            Ok(())
        }
        Command::Reopen => client.reopen_conversation().await,
        Command::Edit(n, text) => match message_at(&client.conversation(), n) {
            Some(id) => client.edit_message(&id, &text).await,
            None => {
                println!("No message {n}.");
                Ok(())
            }
        },
        Command::Delete(n) => match message_at(&client.conversation(), n) {
            Some(id) => client.delete_message(&id).await,
            None => {
                println!("No message {n}.");
                Ok(())
            }
        },
        Command::Send(text) => client.send(&text).await.map(|_| ()),
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(e) = outcome {
        println!("Error: {}", e.current_context());
    }
}

fn message_at(view: &ConversationView, n: usize) -> Option<MessageId> {
    view.messages.get(n.checked_sub(1)?).map(|m| m.id.clone())
}

/// Prints messages as they first appear in the followed conversation.
async fn print_incoming(mut view: watch::Receiver<ConversationView>) {
    let mut shown: HashSet<MessageId> = HashSet::new();
    let mut last_state = ConversationState::Unsubscribed;
    while view.changed().await.is_ok() {
        let current = view.borrow_and_update().clone();
        if current.state != last_state {
            match (&current.state, &current.error) {
                (ConversationState::Interrupted, Some(error)) => {
                    println!("Conversation interrupted: {error}. Use /reopen.");
                }
                (ConversationState::Unsubscribed, Some(error)) => println!("{error}"),
                (ConversationState::Unsubscribed, None) => shown.clear(),
                _ => {}
            }
            last_state = current.state;
        }
        for (n, message) in current.messages.iter().enumerate() {
            if shown.insert(message.id.clone()) {
                let edited = if message.edited { " (edited)" } else { "" };
                println!(
                    "[{}] {} {}: {}{edited}",
                    n + 1,
                    message.timestamp.format("%H:%M:%S"),
                    message.sender_id,
                    message.text
                );
            }
        }
    }
}
