use carepath_core::config::TRIMMED_HISTORY_TURNS;
use carepath_core::{ConversationMessage, MessageRole, Session};
use carepath_router::DispatchDescriptor;

use crate::request::RequestContext;

/// Render the trailing `TRIMMED_HISTORY_TURNS` user/assistant turns (one
/// turn = one user message and its paired assistant reply) into the wire
/// shape a worker payload embeds (§4.9 step 5).
pub fn trimmed_history(session: &Session) -> Vec<serde_json::Value> {
    let keep = TRIMMED_HISTORY_TURNS * 2;
    let start = session.history.len().saturating_sub(keep);
    session.history[start..].iter().map(render_message).collect()
}

fn render_message(message: &ConversationMessage) -> serde_json::Value {
    serde_json::json!({
        "role": role_str(message.role),
        "content": message.content,
        "timestamp": message.timestamp,
    })
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

pub fn user_context_json(context: Option<&RequestContext>) -> serde_json::Value {
    match context {
        None => serde_json::json!({}),
        Some(ctx) => serde_json::json!({
            "language": ctx.language,
            "user_type": ctx.user_type,
            "department": ctx.department,
            "priority": ctx.priority,
        }),
    }
}

/// The human-readable placeholder shown while an agent works a dispatched
/// task; the router may customize it per intent (§4.9 step 6).
pub fn placeholder_for_intent(intent: &str, _descriptor: &DispatchDescriptor) -> String {
    match intent {
        "appointment_booking" => "Looking into appointment availability for you…".to_string(),
        "appointment_modify" => "Working on your appointment change…".to_string(),
        "post_discharge" => "Pulling up your discharge instructions…".to_string(),
        "pre_admission" => "Checking pre-admission requirements…".to_string(),
        _ => "We're processing your request…".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use carepath_core::{Language, MessageMetadata, Session, SessionId};

    use super::*;

    fn msg(role: MessageRole, content: &str) -> ConversationMessage {
        ConversationMessage {
            timestamp: chrono::Utc::now(),
            role,
            content: content.to_string(),
            metadata: MessageMetadata::default(),
        }
    }

    #[test]
    fn trims_to_last_three_turns() {
        let mut session = Session::new(SessionId::new(), "u-1", Language::En);
        for i in 0..10 {
            let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
            session.append_message(msg(role, &i.to_string()), 50);
        }
        let trimmed = trimmed_history(&session);
        assert_eq!(trimmed.len(), 6);
        assert_eq!(trimmed.first().unwrap()["content"], "4");
        assert_eq!(trimmed.last().unwrap()["content"], "9");
    }

    #[test]
    fn short_history_returns_everything() {
        let mut session = Session::new(SessionId::new(), "u-1", Language::En);
        session.append_message(msg(MessageRole::User, "hi"), 50);
        assert_eq!(trimmed_history(&session).len(), 1);
    }

    #[test]
    fn user_context_forwards_department() {
        let context = RequestContext {
            department: Some("cardiology".to_string()),
            ..Default::default()
        };
        let rendered = user_context_json(Some(&context));
        assert_eq!(rendered["department"], "cardiology");
    }

    #[test]
    fn user_context_without_context_is_empty_object() {
        assert_eq!(user_context_json(None), serde_json::json!({}));
    }
}
