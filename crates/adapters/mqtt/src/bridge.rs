//! Event loop that drives the MQTT connection and routes device telemetry.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tankhub_app::ports::TelemetrySink;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;
use crate::dispatcher::MqttDispatcher;
use crate::error::MqttError;
use crate::message;
use crate::topics::{InboundTopic, Topics};

/// Create a client for `config`.
///
/// Nothing touches the network until [`MqttBridge::start`] polls the event
/// loop; the returned dispatcher queues commands in the meantime.
#[must_use]
pub fn connect(config: &MqttConfig) -> (MqttDispatcher, MqttBridge) {
    let mut options = MqttOptions::new(
        config.client_id.clone(),
        config.broker_host.clone(),
        config.broker_port,
    );
    options.set_keep_alive(config.keep_alive());
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username.clone(), password.clone());
    }

    let (client, eventloop) = AsyncClient::new(options, config.channel_capacity.max(1));
    let topics = Topics::new(config.base_topic.clone());
    let dispatcher = MqttDispatcher::new(client.clone(), topics.clone());
    let bridge = MqttBridge {
        client,
        eventloop,
        topics,
        reconnect_delay: config.reconnect_delay(),
    };
    (dispatcher, bridge)
}

/// Owns the rumqttc event loop.
pub struct MqttBridge {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Topics,
    reconnect_delay: Duration,
}

impl MqttBridge {
    /// Spawn the event loop, forwarding inbound messages into `sink` until
    /// `shutdown` flips to `true`.
    pub fn start<K>(self, sink: K, shutdown: watch::Receiver<bool>) -> JoinHandle<()>
    where
        K: TelemetrySink + 'static,
    {
        tokio::spawn(self.run(sink, shutdown))
    }

    async fn run<K: TelemetrySink>(mut self, sink: K, mut shutdown: watch::Receiver<bool>) {
        loop {
            let event = tokio::select! {
                event = self.eventloop.poll() => event,
                _ = shutdown.changed() => {
                    tracing::info!("MQTT bridge shutting down");
                    if let Err(err) = self.client.try_disconnect() {
                        tracing::debug!(%err, "MQTT disconnect request not queued");
                    }
                    return;
                }
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("MQTT connected");
                    Self::subscribe(&self.client, &self.topics).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Err(err) =
                        handle_message(&sink, &self.topics, &publish.topic, &publish.payload).await
                    {
                        tracing::warn!(topic = %publish.topic, %err, "dropping MQTT message");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%err, "MQTT connection error, reconnecting");
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    async fn subscribe(client: &AsyncClient, topics: &Topics) {
        for filter in topics.subscriptions() {
            if let Err(err) = client.subscribe(filter.as_str(), QoS::AtLeastOnce).await {
                tracing::error!(%filter, %err, "MQTT subscribe failed");
            }
        }
    }
}

/// Route one inbound message into `sink`.
pub(crate) async fn handle_message<K: TelemetrySink>(
    sink: &K,
    topics: &Topics,
    topic: &str,
    payload: &[u8],
) -> Result<(), MqttError> {
    match topics.parse(topic)? {
        InboundTopic::DeviceLog(device_id) => {
            let draft = message::decode_log(&device_id, payload)?;
            let log = sink.record_log(draft).await.map_err(MqttError::Domain)?;
            tracing::debug!(log_id = %log.id, %device_id, "device log stored");
        }
        InboundTopic::Step(execution_id) => {
            let step = message::decode_step(payload)?;
            match step.task_index {
                Some(task_index) => sink
                    .record_step(execution_id, task_index, step.report())
                    .await
                    .map_err(MqttError::Domain)?,
                None if !step.success => {
                    let reason = step
                        .message
                        .unwrap_or_else(|| "device reported failure".to_string());
                    sink.record_failure(execution_id, reason)
                        .await
                        .map_err(MqttError::Domain)?;
                }
                None => return Err(MqttError::IncompleteStep),
            }
        }
        InboundTopic::Heartbeat(execution_id) => sink
            .record_heartbeat(execution_id)
            .await
            .map_err(MqttError::Domain)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Mutex;

    use tankhub_domain::error::{NotFoundError, TankHubError};
    use tankhub_domain::execution::StepReport;
    use tankhub_domain::id::ExecutionId;
    use tankhub_domain::time::now;
    use tankhub_domain::work_log::{WorkLog, WorkLogDraft, WorkLogStatus};

    use super::*;

    #[derive(Debug, PartialEq)]
    enum Call {
        Log(WorkLogDraft),
        Step(ExecutionId, usize, StepReport),
        Failure(ExecutionId, String),
        Heartbeat(ExecutionId),
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<Call>>,
        missing: bool,
    }

    impl RecordingSink {
        fn push(&self, call: Call) -> Result<(), TankHubError> {
            if self.missing {
                return Err(NotFoundError {
                    entity: "Execution",
                    id: "x".to_string(),
                }
                .into());
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl TelemetrySink for RecordingSink {
        fn record_log(
            &self,
            draft: WorkLogDraft,
        ) -> impl Future<Output = Result<WorkLog, TankHubError>> + Send {
            let log = draft.clone().into_log(now());
            let result = self.push(Call::Log(draft)).map(|()| log);
            async { result }
        }

        fn record_step(
            &self,
            execution_id: ExecutionId,
            task_index: usize,
            report: StepReport,
        ) -> impl Future<Output = Result<(), TankHubError>> + Send {
            let result = self.push(Call::Step(execution_id, task_index, report));
            async { result }
        }

        fn record_failure(
            &self,
            execution_id: ExecutionId,
            message: String,
        ) -> impl Future<Output = Result<(), TankHubError>> + Send {
            let result = self.push(Call::Failure(execution_id, message));
            async { result }
        }

        fn record_heartbeat(
            &self,
            execution_id: ExecutionId,
        ) -> impl Future<Output = Result<(), TankHubError>> + Send {
            let result = self.push(Call::Heartbeat(execution_id));
            async { result }
        }
    }

    fn topics() -> Topics {
        Topics::new("tankhub")
    }

    #[tokio::test]
    async fn should_store_device_log() {
        let sink = RecordingSink::default();
        handle_message(
            &sink,
            &topics(),
            "tankhub/devices/valve-2/log",
            br#"{"status":"error","message":"stuck"}"#,
        )
        .await
        .unwrap();

        let calls = sink.calls.lock().unwrap();
        let Call::Log(draft) = &calls[0] else {
            panic!("expected a log, got {calls:?}");
        };
        assert_eq!(draft.device_id.as_str(), "valve-2");
        assert_eq!(draft.status, WorkLogStatus::Error);
    }

    #[tokio::test]
    async fn should_record_step_with_task_index() {
        let sink = RecordingSink::default();
        let id = ExecutionId::new();
        handle_message(
            &sink,
            &topics(),
            &format!("tankhub/executions/{id}/step"),
            br#"{"taskIndex":2,"success":false,"message":"low pressure"}"#,
        )
        .await
        .unwrap();

        assert_eq!(
            *sink.calls.lock().unwrap(),
            vec![Call::Step(
                id,
                2,
                StepReport {
                    success: false,
                    output: serde_json::Value::Null,
                    message: Some("low pressure".to_string()),
                }
            )]
        );
    }

    #[tokio::test]
    async fn should_fail_execution_on_failure_without_task_index() {
        let sink = RecordingSink::default();
        let id = ExecutionId::new();
        handle_message(
            &sink,
            &topics(),
            &format!("tankhub/executions/{id}/step"),
            br#"{"success":false}"#,
        )
        .await
        .unwrap();

        assert_eq!(
            *sink.calls.lock().unwrap(),
            vec![Call::Failure(id, "device reported failure".to_string())]
        );
    }

    #[tokio::test]
    async fn should_reject_successful_step_without_task_index() {
        let sink = RecordingSink::default();
        let id = ExecutionId::new();
        let result = handle_message(
            &sink,
            &topics(),
            &format!("tankhub/executions/{id}/step"),
            br#"{"success":true}"#,
        )
        .await;
        assert!(matches!(result, Err(MqttError::IncompleteStep)));
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_forward_heartbeat() {
        let sink = RecordingSink::default();
        let id = ExecutionId::new();
        handle_message(
            &sink,
            &topics(),
            &format!("tankhub/executions/{id}/heartbeat"),
            b"",
        )
        .await
        .unwrap();
        assert_eq!(*sink.calls.lock().unwrap(), vec![Call::Heartbeat(id)]);
    }

    #[tokio::test]
    async fn should_surface_sink_errors_as_domain_errors() {
        let sink = RecordingSink {
            missing: true,
            ..RecordingSink::default()
        };
        let id = ExecutionId::new();
        let result = handle_message(
            &sink,
            &topics(),
            &format!("tankhub/executions/{id}/heartbeat"),
            b"{}",
        )
        .await;
        assert!(matches!(
            result,
            Err(MqttError::Domain(TankHubError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn should_reject_malformed_payload() {
        let sink = RecordingSink::default();
        let result = handle_message(
            &sink,
            &topics(),
            "tankhub/devices/pump-1/log",
            b"not json",
        )
        .await;
        assert!(matches!(result, Err(MqttError::PayloadParse(_))));
    }

    #[tokio::test]
    async fn should_stop_bridge_on_shutdown() {
        let (_dispatcher, bridge) = connect(&MqttConfig {
            broker_port: 1,
            reconnect_delay_secs: 0,
            ..MqttConfig::default()
        });
        let (tx, rx) = watch::channel(false);
        let handle = bridge.start(RecordingSink::default(), rx);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
