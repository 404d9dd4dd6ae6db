use std::collections::HashMap;
use std::time::Duration;

use carepath_core::config::{AgentTopicConfig, AgentsConfig};
use tracing::debug;

const BUILTIN_GENERAL_INFO_REQUEST_TOPIC: &str = "knowledge-base-requests";
const BUILTIN_GENERAL_INFO_RESPONSE_TOPIC: &str = "knowledge-base-responses";
const BUILTIN_GENERAL_INFO_TASK_TYPE: &str = "knowledge_base_query";
const BUILTIN_GENERAL_INFO_PAYLOAD_BUILDER: &str = "general_info";
const BUILTIN_SOFT_DEADLINE_MS: u64 = 4_000;
const BUILTIN_HARD_DEADLINE_MS: u64 = 8_000;

pub const GENERAL_INFO_INTENT: &str = "general_info";

/// The dispatch descriptor the Message Bus Client consumes to produce a
/// task-request envelope (§4.5, §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchDescriptor {
    pub request_topic: String,
    pub response_topic: String,
    pub task_type: String,
    pub payload_builder: String,
    pub soft_deadline: Duration,
    pub hard_deadline: Duration,
}

impl From<&AgentTopicConfig> for DispatchDescriptor {
    fn from(config: &AgentTopicConfig) -> Self {
        Self {
            request_topic: config.request_topic.clone(),
            response_topic: config.response_topic.clone(),
            task_type: config.task_type.clone(),
            payload_builder: config.payload_builder.clone(),
            soft_deadline: Duration::from_millis(config.soft_deadline_ms),
            hard_deadline: Duration::from_millis(config.hard_deadline_ms),
        }
    }
}

fn builtin_general_info() -> DispatchDescriptor {
    DispatchDescriptor {
        request_topic: BUILTIN_GENERAL_INFO_REQUEST_TOPIC.to_string(),
        response_topic: BUILTIN_GENERAL_INFO_RESPONSE_TOPIC.to_string(),
        task_type: BUILTIN_GENERAL_INFO_TASK_TYPE.to_string(),
        payload_builder: BUILTIN_GENERAL_INFO_PAYLOAD_BUILDER.to_string(),
        soft_deadline: Duration::from_millis(BUILTIN_SOFT_DEADLINE_MS),
        hard_deadline: Duration::from_millis(BUILTIN_HARD_DEADLINE_MS),
    }
}

/// Pure intent → dispatch-descriptor lookup (§4.5). No I/O: it is cheap to
/// call on every turn and safe to call from inside a lock.
pub struct AgentRouter {
    table: HashMap<String, AgentTopicConfig>,
}

impl AgentRouter {
    pub fn new(config: &AgentsConfig) -> Self {
        Self {
            table: config.table.clone(),
        }
    }

    /// Resolve an intent to its dispatch descriptor. Any intent absent from
    /// the configuration table — including an unrecognized one — falls
    /// back to the built-in `general_info` handler.
    pub fn route(&self, intent: &str) -> DispatchDescriptor {
        match self.table.get(intent) {
            Some(config) => DispatchDescriptor::from(config),
            None => {
                debug!(intent, "intent not in agent table, routing to built-in general_info handler");
                match self.table.get(GENERAL_INFO_INTENT) {
                    Some(config) => DispatchDescriptor::from(config),
                    None => builtin_general_info(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> AgentsConfig {
        let mut table = HashMap::new();
        table.insert(
            "appointment_booking".to_string(),
            AgentTopicConfig {
                request_topic: "appointment-agent-requests".to_string(),
                response_topic: "appointment-agent-responses".to_string(),
                task_type: "book_appointment".to_string(),
                payload_builder: "appointment_booking".to_string(),
                soft_deadline_ms: 3_000,
                hard_deadline_ms: 6_000,
            },
        );
        AgentsConfig { table }
    }

    #[test]
    fn routes_configured_intent() {
        let router = AgentRouter::new(&sample_config());
        let descriptor = router.route("appointment_booking");
        assert_eq!(descriptor.request_topic, "appointment-agent-requests");
    }

    #[test]
    fn unknown_intent_falls_back_to_builtin_general_info() {
        let router = AgentRouter::new(&sample_config());
        let descriptor = router.route("some_unmapped_intent");
        assert_eq!(descriptor.request_topic, BUILTIN_GENERAL_INFO_REQUEST_TOPIC);
    }

    #[test]
    fn configured_general_info_overrides_builtin() {
        let mut config = sample_config();
        config.table.insert(
            GENERAL_INFO_INTENT.to_string(),
            AgentTopicConfig {
                request_topic: "custom-kb-requests".to_string(),
                response_topic: "custom-kb-responses".to_string(),
                task_type: "kb_query".to_string(),
                payload_builder: "general_info".to_string(),
                soft_deadline_ms: 1_000,
                hard_deadline_ms: 2_000,
            },
        );
        let router = AgentRouter::new(&config);
        assert_eq!(router.route(GENERAL_INFO_INTENT).request_topic, "custom-kb-requests");
    }
}
