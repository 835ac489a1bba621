//! MQTT integration configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the MQTT integration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Whether the daemon connects to a broker at all.
    pub enabled: bool,
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Base topic prefix for all tankhub MQTT communication.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Capacity of the outgoing request channel.
    pub channel_capacity: usize,
    /// Pause between reconnection attempts, in seconds.
    pub reconnect_delay_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "tankhub".to_string(),
            base_topic: "tankhub".to_string(),
            keep_alive_secs: 30,
            username: None,
            password: None,
            channel_capacity: 64,
            reconnect_delay_secs: 5,
        }
    }
}

impl MqttConfig {
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}
