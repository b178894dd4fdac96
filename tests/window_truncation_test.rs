// tests/window_truncation_test.rs
//
// S3: working-window truncation keeps preserved system messages plus the
// last `size` non-system messages, while full history stays intact.

use chrono::Utc;
use osqr_vault::episodic::{Message, Role};
use osqr_vault::working_window::{compute_working_window, WindowConfig, WindowMode, WorkingMemoryBuffer};

fn msg(role: Role, content: &str) -> Message {
    Message::new(role, content.to_string(), Utc::now(), Some(1))
}

#[tokio::test]
async fn full_history_keeps_all_six_messages_window_keeps_last_two_non_system() {
    let mut buffer = WorkingMemoryBuffer::new(
        "s1".into(),
        WindowConfig {
            mode: WindowMode::Messages,
            size: 2,
            preserve_system_messages: true,
        },
        1000,
    );

    for (role, content) in [
        (Role::System, "S1"),
        (Role::User, "U1"),
        (Role::Assistant, "A1"),
        (Role::User, "U2"),
        (Role::Assistant, "A2"),
        (Role::User, "U3"),
    ] {
        buffer.add_message(msg(role, content));
    }

    assert_eq!(buffer.full_history.len(), 6);

    let contents: Vec<&str> = buffer.working_window.iter().map(|m| m.content.as_str()).collect();
    assert!(contents.contains(&"S1"), "preserved system message must stay in the window");
    assert!(contents.contains(&"U3"), "most recent message must be in the window");
    assert_eq!(contents.len(), 3, "size=2 plus one preserved system message");

    let result = compute_working_window(&buffer.full_history, &buffer.window_config);
    assert_eq!(result.messages_excluded, 3);
}
