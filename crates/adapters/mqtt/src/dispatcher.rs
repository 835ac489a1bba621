//! [`TaskDispatcher`] over MQTT.

use rumqttc::{AsyncClient, QoS};
use tankhub_app::ports::{StartCommand, StopCommand, TaskDispatcher};
use tankhub_domain::error::TankHubError;

use crate::error::MqttError;
use crate::message::{self, StartPayload, StopPayload};
use crate::topics::Topics;

/// Publishes start/stop commands for devices to pick up.
///
/// Publishing only queues the request on the client; delivery happens while
/// the [`MqttBridge`](crate::MqttBridge) event loop runs. A full queue or a
/// dropped event loop surfaces as [`TankHubError::Dispatch`].
#[derive(Clone)]
pub struct MqttDispatcher {
    client: AsyncClient,
    topics: Topics,
}

impl MqttDispatcher {
    pub(crate) fn new(client: AsyncClient, topics: Topics) -> Self {
        Self { client, topics }
    }

    async fn publish(&self, topic: String, payload: Vec<u8>) -> Result<(), MqttError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

impl TaskDispatcher for MqttDispatcher {
    #[tracing::instrument(skip(self, command), fields(execution_id = %command.execution_id))]
    async fn dispatch_start(&self, command: StartCommand) -> Result<(), TankHubError> {
        let topic = self.topics.start(command.process_id);
        let payload = message::encode(&StartPayload::from(command))?;
        self.publish(topic, payload).await?;
        tracing::debug!("start command published");
        Ok(())
    }

    #[tracing::instrument(skip(self, command), fields(execution_id = %command.execution_id))]
    async fn dispatch_stop(&self, command: StopCommand) -> Result<(), TankHubError> {
        let topic = self.topics.stop(command.process_id);
        let payload = message::encode(&StopPayload::from(command))?;
        self.publish(topic, payload).await?;
        tracing::debug!("stop command published");
        Ok(())
    }
}
