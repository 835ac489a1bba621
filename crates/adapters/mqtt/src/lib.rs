//! # tankhub-adapter-mqtt
//!
//! MQTT adapter: connects the execution coordinator to devices on a broker.
//!
//! ## Responsibilities
//! - Implement the `TaskDispatcher` port: publish start/stop commands on
//!   `{base}/processes/{processId}/start|stop`
//! - Subscribe to device telemetry and feed it into a `TelemetrySink`:
//!   - `{base}/devices/{deviceId}/log`: work logs
//!   - `{base}/executions/{executionId}/step`: step results
//!   - `{base}/executions/{executionId}/heartbeat`: liveness
//!
//! ## Dependency rule
//! Same as other adapters: depends on `tankhub-app` and `tankhub-domain`.

mod bridge;
mod config;
mod dispatcher;
mod error;
mod message;
mod topics;

pub use bridge::{MqttBridge, connect};
pub use config::MqttConfig;
pub use dispatcher::MqttDispatcher;
pub use error::MqttError;
pub use topics::{InboundTopic, Topics};
