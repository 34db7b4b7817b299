//! Shared history-compression logic.
//!
//! Compression keeps system messages and the most recent `max_messages`
//! non-system messages verbatim, and asks the LLM to summarize everything
//! older into a single system message. Providers own the atomic swap of the
//! rebuilt history; this module owns the partitioning and the prompt.

use axon_core::message::{Message, Role};

const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes conversation \
history while preserving important context and key information.";

pub(crate) struct Partitioned {
    pub system: Vec<Message>,
    pub old: Vec<Message>,
    pub recent: Vec<Message>,
}

/// Split history into system messages, old non-system messages, and the
/// most recent `max_messages` non-system messages.
pub(crate) fn partition(messages: &[Message], max_messages: usize) -> Partitioned {
    let mut system = Vec::new();
    let mut non_system = Vec::new();
    for message in messages {
        if message.role == Role::System {
            system.push(message.clone());
        } else {
            non_system.push(message.clone());
        }
    }

    let split = non_system.len().saturating_sub(max_messages);
    let recent = non_system.split_off(split);
    Partitioned {
        system,
        old: non_system,
        recent,
    }
}

/// The fixed summarization request sent to the LLM.
pub(crate) fn summary_request(old: &[Message]) -> Vec<Message> {
    let mut prompt = String::from(
        "Please provide a concise summary of the following conversation history, \
preserving key information and context:\n\n",
    );
    for message in old {
        prompt.push_str(&format!("{}: {}\n", role_label(&message.role), message.text()));
    }

    vec![Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(prompt)]
}

/// The rebuilt history: originals' system messages, then the summary as a
/// system message, then the recent tail verbatim.
pub(crate) fn rebuild(system: Vec<Message>, summary: &str, recent: Vec<Message>) -> Vec<Message> {
    let mut messages = system;
    messages.push(Message::system(format!(
        "Previous conversation summary: {summary}"
    )));
    messages.extend(recent);
    messages
}

fn role_label(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}
