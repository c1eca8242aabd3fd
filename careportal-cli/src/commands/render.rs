//! Terminal rendering of threads, messages, and doctors.

use std::collections::HashSet;

use colored::Colorize;
use shared::models::{Doctor, Message, Thread, Timestamp};

/// `Saturday, March 8, 2025`
#[must_use]
pub fn day_header(at: &Timestamp) -> String {
    at.0.format("%A, %B %-d, %Y").to_string()
}

#[must_use]
pub fn clock(at: Option<&Timestamp>) -> String {
    at.map_or_else(|| "--:--".to_string(), |at| at.0.format("%H:%M").to_string())
}

/// One inbox row, without colour.
#[must_use]
pub fn thread_line(thread: &Thread) -> String {
    let mut line = format!("{}  {}", thread.id, thread.display_name());
    if !thread.counterpart_role.is_empty() {
        line.push_str(&format!(" ({})", thread.counterpart_role));
    }
    if thread.display_name() != thread.title {
        line.push_str(&format!(" - {}", thread.title));
    }
    if thread.unread_count > 0 {
        line.push_str(&format!(" [{} unread]", thread.unread_count));
    }
    line
}

pub fn print_threads(threads: &[Thread], unread_total: u32) {
    if threads.is_empty() {
        println!("No threads found.");
        return;
    }
    println!("{}", format!("Inbox ({unread_total} unread)").bold());
    for thread in threads {
        let line = thread_line(thread);
        if thread.unread_count > 0 {
            println!("{}", line.bold());
        } else {
            println!("{line}");
        }
        let when = thread
            .last_message_at
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        if !thread.last_message_snippet.is_empty() || !when.is_empty() {
            println!("    {} {}", thread.last_message_snippet, when.dimmed());
        }
    }
}

pub fn print_doctors(doctors: &[Doctor]) {
    if doctors.is_empty() {
        println!("No doctors available.");
        return;
    }
    for doctor in doctors {
        let id = doctor.user_id.as_deref().unwrap_or(&doctor.id);
        if doctor.specialization.is_empty() {
            println!("{id}  {}", doctor.display_name);
        } else {
            println!(
                "{id}  {} {}",
                doctor.display_name,
                format!("({})", doctor.specialization).dimmed()
            );
        }
    }
}

/// Prints messages in order, with a date line whenever the calendar day changes.
/// A message id is printed at most once.
#[derive(Debug, Default)]
pub struct MessagePrinter {
    last_day: Option<Timestamp>,
    shown: HashSet<String>,
}

impl MessagePrinter {
    /// Whether `at` starts a new day relative to the last printed message.
    /// Undated messages never open a new day.
    pub fn starts_new_day(&mut self, at: Option<&Timestamp>) -> bool {
        let Some(at) = at else {
            return false;
        };
        let new_day = self
            .last_day
            .as_ref()
            .is_none_or(|last| !last.same_day(at));
        self.last_day = Some(at.clone());
        new_day
    }

    /// Record `message` as shown; false if its id was printed before.
    pub fn first_sighting(&mut self, message: &Message) -> bool {
        self.shown.insert(message.id.clone())
    }

    pub fn print(&mut self, message: &Message) {
        if !self.first_sighting(message) {
            return;
        }
        if let Some(at) = &message.sent_at
            && self.starts_new_day(Some(at))
        {
            println!("{}", format!("-- {} --", day_header(at)).dimmed());
        }
        let sender = if message.is_mine {
            message.sender_name.cyan().bold()
        } else {
            message.sender_name.green().bold()
        };
        let status = if message.is_pending() {
            format!(" {}", "(sending)".yellow())
        } else {
            String::new()
        };
        println!(
            "[{}] {}: {}{}",
            clock(message.sent_at.as_ref()),
            sender,
            message.body,
            status
        );
    }

    pub fn print_all(&mut self, messages: &[Message]) {
        for message in messages {
            self.print(message);
        }
    }
}
