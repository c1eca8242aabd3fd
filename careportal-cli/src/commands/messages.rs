//! One-shot inbox commands: list, open, send, compose.

use anyhow::{Result, bail};
use clap::Args;
use client::{Composer, SendOutcome};
use colored::Colorize;
use shared::config::client::Config;

use super::{
    connect, explain,
    render::{self, MessagePrinter},
};

#[derive(Args, Debug)]
pub struct ThreadsArgs {
    /// Filter by subject, snippet, or counterpart name
    #[arg(long, short)]
    pub search: Option<String>,

    /// Number of extra pages to fetch after the first one
    #[arg(long, default_value_t = 0)]
    pub more: u32,
}

#[derive(Args, Debug)]
pub struct OpenArgs {
    /// Thread id
    pub thread_id: String,

    /// Number of older pages to load before printing
    #[arg(long, default_value_t = 0)]
    pub older: u32,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Thread id
    pub thread_id: String,

    /// Message text; multiple words are joined with spaces
    #[arg(required = true, num_args = 1..)]
    pub body: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Portal user id of the doctor (see `careportal doctors`)
    #[arg(long, short)]
    pub doctor: String,

    /// Thread subject
    #[arg(long, short)]
    pub subject: String,

    /// First message of the thread
    #[arg(required = true, num_args = 1..)]
    pub body: Vec<String>,
}

pub async fn threads(args: ThreadsArgs, config: &Config) -> Result<()> {
    let store = connect(config)?;
    let search = args.search.as_deref().map(str::trim).filter(|q| !q.is_empty());

    store.browse_threads(search).await.map_err(explain)?;
    for _ in 0..args.more {
        if store.load_more_threads().await.map_err(explain)? == 0 {
            break;
        }
    }
    store.resolve_counterparts().await;
    if let Err(err) = store.refresh_unread_count().await {
        tracing::debug!(error = %err, "unread count unavailable");
    }

    let state = store.snapshot().await;
    let threads = match search {
        Some(query) => state.filtered_threads(query),
        None => state.threads.clone(),
    };
    render::print_threads(&threads, state.unread_total);
    Ok(())
}

pub async fn open(args: OpenArgs, config: &Config) -> Result<()> {
    let store = connect(config)?;
    if let Err(err) = store.browse_threads(None).await {
        tracing::debug!(error = %err, "thread list unavailable");
    }
    store.select_thread(&args.thread_id).await.map_err(explain)?;
    for _ in 0..args.older {
        if store.load_older_messages(None).await.map_err(explain)? == 0 {
            break;
        }
    }

    let state = store.snapshot().await;
    if let Some(thread) = state.active_thread() {
        println!("{}", render::thread_line(thread).bold());
    }
    if state.messages.is_empty() {
        println!("No messages yet.");
    }
    MessagePrinter::default().print_all(&state.messages);
    if state.messages_cursor.is_some() {
        println!("{}", "(older messages available with --older)".dimmed());
    }
    Ok(())
}

pub async fn send(args: SendArgs, config: &Config) -> Result<()> {
    let body = args.body.join(" ");
    if body.trim().is_empty() {
        bail!("message must not be empty");
    }

    let store = connect(config)?;
    store.select_thread(&args.thread_id).await.map_err(explain)?;
    let composer = Composer::new(store);
    match composer.send(&args.thread_id, &body).await.map_err(explain)? {
        SendOutcome::Sent(Some(message)) => println!("Sent message {}", message.id),
        SendOutcome::Sent(None) => println!("Sent."),
        SendOutcome::Rejected(reason) => bail!("message not sent: {reason}"),
    }
    Ok(())
}

pub async fn compose(args: ComposeArgs, config: &Config) -> Result<()> {
    let store = connect(config)?;
    let body = args.body.join(" ");
    match store
        .create_thread(&args.doctor, &args.subject, &body)
        .await
        .map_err(explain)?
    {
        Some(thread_id) => println!("Started thread {thread_id}"),
        None => println!("Thread created."),
    }
    Ok(())
}

pub async fn doctors(config: &Config) -> Result<()> {
    let store = connect(config)?;
    let doctors = store.list_doctors().await.map_err(explain)?;
    render::print_doctors(&doctors);
    Ok(())
}

pub async fn unread(config: &Config) -> Result<()> {
    let store = connect(config)?;
    let count = store.refresh_unread_count().await.map_err(explain)?;
    println!("{count}");
    Ok(())
}
