//! Topic layout under the configured base prefix.

use tankhub_domain::id::{DeviceId, ExecutionId, ProcessId};

use crate::error::MqttError;

/// A message topic the bridge knows how to route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTopic {
    /// `{base}/devices/{deviceId}/log`
    DeviceLog(DeviceId),
    /// `{base}/executions/{executionId}/step`
    Step(ExecutionId),
    /// `{base}/executions/{executionId}/heartbeat`
    Heartbeat(ExecutionId),
}

/// Builds and parses topics rooted at one base prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn start(&self, process_id: ProcessId) -> String {
        format!("{}/processes/{process_id}/start", self.base)
    }

    #[must_use]
    pub fn stop(&self, process_id: ProcessId) -> String {
        format!("{}/processes/{process_id}/stop", self.base)
    }

    /// Filters the bridge subscribes to after every (re)connect.
    #[must_use]
    pub fn subscriptions(&self) -> [String; 3] {
        [
            format!("{}/devices/+/log", self.base),
            format!("{}/executions/+/step", self.base),
            format!("{}/executions/+/heartbeat", self.base),
        ]
    }

    /// Route an incoming topic.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::UnknownTopic`] for anything outside the layout,
    /// including malformed device or execution ids.
    pub fn parse(&self, topic: &str) -> Result<InboundTopic, MqttError> {
        let unknown = || MqttError::UnknownTopic(topic.to_string());
        let rest = topic
            .strip_prefix(self.base.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(unknown)?;

        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            ["devices", device, "log"] => DeviceId::new(*device)
                .map(InboundTopic::DeviceLog)
                .map_err(|_| unknown()),
            ["executions", execution, "step"] => execution
                .parse()
                .map(InboundTopic::Step)
                .map_err(|_| unknown()),
            ["executions", execution, "heartbeat"] => execution
                .parse()
                .map(InboundTopic::Heartbeat)
                .map_err(|_| unknown()),
            _ => Err(unknown()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_command_topics_under_base() {
        let topics = Topics::new("farm/");
        let process_id = ProcessId::new();
        assert_eq!(
            topics.start(process_id),
            format!("farm/processes/{process_id}/start")
        );
        assert_eq!(
            topics.stop(process_id),
            format!("farm/processes/{process_id}/stop")
        );
    }

    #[test]
    fn should_list_wildcard_subscriptions() {
        let topics = Topics::new("tankhub");
        assert_eq!(
            topics.subscriptions(),
            [
                "tankhub/devices/+/log".to_string(),
                "tankhub/executions/+/step".to_string(),
                "tankhub/executions/+/heartbeat".to_string(),
            ]
        );
    }

    #[test]
    fn should_parse_device_log_topic() {
        let topics = Topics::new("tankhub");
        assert_eq!(
            topics.parse("tankhub/devices/pump-1/log").unwrap(),
            InboundTopic::DeviceLog(DeviceId::new("pump-1").unwrap())
        );
    }

    #[test]
    fn should_parse_execution_topics() {
        let topics = Topics::new("tankhub");
        let id = ExecutionId::new();
        assert_eq!(
            topics.parse(&format!("tankhub/executions/{id}/step")).unwrap(),
            InboundTopic::Step(id)
        );
        assert_eq!(
            topics
                .parse(&format!("tankhub/executions/{id}/heartbeat"))
                .unwrap(),
            InboundTopic::Heartbeat(id)
        );
    }

    #[test]
    fn should_reject_topics_outside_layout() {
        let topics = Topics::new("tankhub");
        for topic in [
            "other/devices/pump-1/log",
            "tankhub/devices/pump-1/status",
            "tankhub/executions/not-a-uuid/step",
            "tankhubx/devices/pump-1/log",
            "tankhub",
        ] {
            assert!(
                matches!(topics.parse(topic), Err(MqttError::UnknownTopic(_))),
                "{topic} should be rejected"
            );
        }
    }
}
