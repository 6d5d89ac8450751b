//! Sliding-window transcript trimming.
//!
//! The first two messages (system prompt and the user's instruction) are
//! pinned; of the rest, only the most recent window is kept. Because a
//! `role:"tool"` message is only valid right after the assistant message
//! that requested it, any orphaned tool messages at the head of the window
//! are dropped too.

use webpilot_core::ChatMessage;

/// Number of pinned messages at the head: system prompt + instruction.
const PINNED: usize = 2;

/// Trim `messages` in place so at most `max_history` unpinned messages
/// remain.
pub fn trim(messages: &mut Vec<ChatMessage>, max_history: usize) {
    if messages.len() <= PINNED + max_history {
        return;
    }

    let tail_start = messages.len() - max_history;
    let mut kept: Vec<ChatMessage> = messages.drain(tail_start..).collect();

    // Drop tool results whose assistant request was trimmed away
    while kept.first().map(|m| m.role.as_str()) == Some("tool") {
        kept.remove(0);
    }

    messages.truncate(PINNED);
    messages.extend(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript_with_rounds(rounds: usize) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::system("you are an agent"),
            ChatMessage::user("do the thing"),
        ];
        for i in 0..rounds {
            messages.push(ChatMessage::assistant(&format!("step {}", i)));
            messages.push(ChatMessage::tool_result(&format!("call_{}", i), "ok"));
        }
        messages
    }

    #[test]
    fn test_short_transcript_untouched() {
        let mut messages = transcript_with_rounds(3);
        let before = messages.len();
        trim(&mut messages, 20);
        assert_eq!(messages.len(), before);
    }

    #[test]
    fn test_trim_keeps_pinned_head() {
        let mut messages = transcript_with_rounds(30);
        trim(&mut messages, 10);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert!(messages.len() <= 2 + 10);
    }

    #[test]
    fn test_trim_drops_orphaned_tool_head() {
        let mut messages = transcript_with_rounds(30);
        // Window of 9 would start mid-round, on a tool message
        trim(&mut messages, 9);
        assert_ne!(messages[2].role, "tool");
        // Remaining tail still alternates starting with assistant
        assert_eq!(messages[2].role, "assistant");
    }

    #[test]
    fn test_trim_keeps_most_recent_messages() {
        let mut messages = transcript_with_rounds(30);
        trim(&mut messages, 10);
        let last = messages.last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("call_29"));
    }
}
