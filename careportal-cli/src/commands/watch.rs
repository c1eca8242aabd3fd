//! `careportal watch`: follow one thread live.

use anyhow::Result;
use clap::Args;
use client::{
    ClientError, Composer, PollConfig, PollEvent, PollingLoop, SendOutcome, Visibility,
};
use colored::Colorize;
use shared::config::client::Config;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, warn};

use super::{
    connect, explain,
    render::{self, MessagePrinter},
};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Thread id
    pub thread_id: String,

    /// Poll interval in milliseconds; defaults to the configured interval
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

pub async fn watch(args: WatchArgs, config: &Config) -> Result<()> {
    let store = connect(config)?;
    if let Err(err) = store.browse_threads(None).await {
        debug!(error = %err, "thread list unavailable");
    }
    store.select_thread(&args.thread_id).await.map_err(explain)?;

    let state = store.snapshot().await;
    if let Some(thread) = state.active_thread() {
        println!("{}", render::thread_line(thread).bold());
    }
    let mut printer = MessagePrinter::default();
    printer.print_all(&state.messages);
    println!(
        "{}",
        "Type a message and press Enter to send. /quit or Ctrl-C to stop.".dimmed()
    );

    let mut poll_config = PollConfig::from_config(config);
    if let Some(interval_ms) = args.interval_ms.filter(|ms| *ms > 0) {
        poll_config.interval = std::time::Duration::from_millis(interval_ms);
    }
    let poller = PollingLoop::new(store.clone(), Visibility::new(), poll_config);
    let mut events = poller.subscribe();
    let handle = poller.spawn();

    let composer = Composer::new(store.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            event = events.recv() => match event {
                Ok(PollEvent::MessagesUpdated { thread_id, new_messages }) if thread_id == args.thread_id => {
                    printer.print_all(&new_messages);
                }
                Ok(PollEvent::UnreadUpdated(count)) => debug!(count, "unread total updated"),
                Ok(PollEvent::SessionExpired) => break Err(explain(ClientError::SessionExpired)),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "poll events dropped"),
                Err(RecvError::Closed) => break Ok(()),
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim() == "/quit" => break Ok(()),
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if let Err(err) = send_line(&composer, &args.thread_id, &line, &mut printer).await {
                        break Err(err);
                    }
                }
                Ok(None) => stdin_open = false,
                Err(err) => {
                    warn!(error = %err, "stdin closed");
                    stdin_open = false;
                }
            },
        }
    };

    handle.shutdown().await;
    result
}

/// Send one typed line. Transient failures are reported and the watch
/// continues; a session expiry ends it.
async fn send_line(
    composer: &Composer,
    thread_id: &str,
    line: &str,
    printer: &mut MessagePrinter,
) -> Result<()> {
    match composer.send(thread_id, line).await {
        Ok(SendOutcome::Sent(Some(message))) => printer.print(&message),
        Ok(SendOutcome::Sent(None)) => println!("{}", "(sent)".dimmed()),
        Ok(SendOutcome::Rejected(reason)) => eprintln!("warning: {reason}"),
        Err(ClientError::SessionExpired) => return Err(explain(ClientError::SessionExpired)),
        Err(err) => eprintln!("{} {err}", "message not sent:".red()),
    }
    Ok(())
}
