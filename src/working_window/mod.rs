// src/working_window/mod.rs
//! Derives the model-visible slice from the immutable full conversation
//! history (spec §4.5). Everything here is synchronous and allocation-light
//! — no I/O, no locks, matching the "must not await" constraint from §5.

use serde::{Deserialize, Serialize};

use crate::episodic::{Message, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    Messages,
    Tokens,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub mode: WindowMode,
    pub size: usize,
    pub preserve_system_messages: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            mode: WindowMode::Messages,
            size: 20,
            preserve_system_messages: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkingWindowResult {
    pub window: Vec<Message>,
    pub tokens_used: usize,
    pub messages_excluded: usize,
}

/// `fullHistory` must not be mutated — the window is a fresh sequence
/// built from clones/references (spec §4.5 invariant).
pub fn compute_working_window(full_history: &[Message], config: &WindowConfig) -> WorkingWindowResult {
    let system: Vec<&Message> = if config.preserve_system_messages {
        full_history.iter().filter(|m| m.role == Role::System).collect()
    } else {
        Vec::new()
    };

    let non_system: Vec<&Message> = full_history
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();

    let tail: Vec<&Message> = match config.mode {
        WindowMode::Messages => {
            let start = non_system.len().saturating_sub(config.size);
            non_system[start..].to_vec()
        }
        WindowMode::Tokens => {
            // Walk from the end, admitting messages while cumulative tokens
            // stay within budget; stop at the first refusal.
            let mut acc = 0usize;
            let mut kept_rev = Vec::new();
            for msg in non_system.iter().rev() {
                if acc + msg.tokens > config.size {
                    break;
                }
                acc += msg.tokens;
                kept_rev.push(*msg);
            }
            kept_rev.reverse();
            kept_rev
        }
    };

    let mut window: Vec<Message> = Vec::with_capacity(system.len() + tail.len());
    window.extend(system.iter().map(|m| (*m).clone()));
    window.extend(tail.iter().map(|m| (*m).clone()));

    let tokens_used: usize = window.iter().map(|m| m.tokens).sum();
    let included_ids: std::collections::HashSet<&str> =
        window.iter().map(|m| m.id.as_str()).collect();
    let messages_excluded = full_history
        .iter()
        .filter(|m| !included_ids.contains(m.id.as_str()))
        .count();

    WorkingWindowResult {
        window,
        tokens_used,
        messages_excluded,
    }
}

/// A human-readable "earlier in this conversation" note for the caller to
/// prepend ahead of the working window (spec §4.5).
pub fn get_excluded_messages_summary(full_history: &[Message], window: &[Message]) -> Option<String> {
    let included: std::collections::HashSet<&str> = window.iter().map(|m| m.id.as_str()).collect();
    let excluded: Vec<&Message> = full_history
        .iter()
        .filter(|m| !included.contains(m.id.as_str()))
        .collect();
    if excluded.is_empty() {
        return None;
    }
    Some(format!(
        "[{} earlier message(s) omitted from this view]",
        excluded.len()
    ))
}

/// Legacy compaction path (spec §4.5): summarizes a prefix, archives it,
/// and replaces the live message list. Retained for backward
/// compatibility; new code should rely on `compute_working_window` instead.
pub fn compact_working_memory(
    full_history: &[Message],
    keep_last_n: usize,
    summarize: impl Fn(&[Message]) -> String,
) -> (String, Vec<Message>) {
    if full_history.len() <= keep_last_n {
        return (String::new(), full_history.to_vec());
    }
    let split = full_history.len() - keep_last_n;
    let (prefix, tail) = full_history.split_at(split);
    (summarize(prefix), tail.to_vec())
}

#[derive(Debug, Clone)]
pub struct WorkingMemoryBuffer {
    pub session_id: String,
    pub full_history: Vec<Message>,
    pub working_window: Vec<Message>,
    pub window_config: WindowConfig,
    pub current_conversation_id: Option<String>,
    pub token_budget: usize,
    pub tokens_used: usize,
}

impl WorkingMemoryBuffer {
    pub fn new(session_id: String, window_config: WindowConfig, token_budget: usize) -> Self {
        Self {
            session_id,
            full_history: Vec::new(),
            working_window: Vec::new(),
            window_config,
            current_conversation_id: None,
            token_budget,
            tokens_used: 0,
        }
    }

    /// Appends to full history then recomputes the window — O(|full_history|)
    /// in tokens mode, O(window size) in messages mode for the recompute
    /// itself (spec §4.5).
    pub fn add_message(&mut self, message: Message) {
        self.full_history.push(message);
        self.recompute();
    }

    pub fn set_window_config(&mut self, config: WindowConfig) {
        self.window_config = config;
        self.recompute();
    }

    fn recompute(&mut self) {
        let result = compute_working_window(&self.full_history, &self.window_config);
        self.working_window = result.window;
        self.tokens_used = result.tokens_used;
    }

    pub fn full_history_tokens(&self) -> usize {
        self.full_history.iter().map(|m| m.tokens).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(role: Role, content: &str, tokens: usize) -> Message {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            tokens,
            utility_score: None,
        }
    }

    #[test]
    fn s3_window_truncation_messages_mode() {
        let history = vec![
            msg(Role::System, "S1", 1),
            msg(Role::User, "U1", 1),
            msg(Role::Assistant, "A1", 1),
            msg(Role::User, "U2", 1),
            msg(Role::Assistant, "A2", 1),
            msg(Role::User, "U3", 1),
        ];
        let config = WindowConfig {
            mode: WindowMode::Messages,
            size: 2,
            preserve_system_messages: true,
        };
        let result = compute_working_window(&history, &config);
        // last 2 non-system messages would be [A2, U3]; but size=2 over a
        // 5-long non-system tail of [U1,A1,U2,A2,U3] keeps [A2,U3].
        let contents: Vec<&str> = result.window.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["S1", "A2", "U3"]);
    }

    #[test]
    fn window_is_subset_of_full_history_by_id() {
        let history = vec![msg(Role::User, "a", 5), msg(Role::User, "b", 5)];
        let config = WindowConfig {
            mode: WindowMode::Tokens,
            size: 5,
            preserve_system_messages: false,
        };
        let result = compute_working_window(&history, &config);
        let ids: std::collections::HashSet<&str> =
            history.iter().map(|m| m.id.as_str()).collect();
        for m in &result.window {
            assert!(ids.contains(m.id.as_str()));
        }
        assert_eq!(result.tokens_used, 5);
    }

    #[test]
    fn full_history_never_mutated() {
        let mut buffer = WorkingMemoryBuffer::new(
            "s1".into(),
            WindowConfig {
                mode: WindowMode::Messages,
                size: 1,
                preserve_system_messages: false,
            },
            100,
        );
        buffer.add_message(msg(Role::User, "a", 1));
        buffer.add_message(msg(Role::User, "b", 1));
        assert_eq!(buffer.full_history.len(), 2);
        assert_eq!(buffer.working_window.len(), 1);
        assert_eq!(buffer.working_window[0].content, "b");
    }
}
