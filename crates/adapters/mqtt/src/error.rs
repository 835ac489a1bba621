//! MQTT adapter error types.

use tankhub_domain::error::TankHubError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client could not queue a request.
    #[error("MQTT client error")]
    Client(#[from] rumqttc::ClientError),

    /// Failed to encode an outgoing payload as JSON.
    #[error("failed to encode MQTT payload")]
    PayloadEncode(#[source] serde_json::Error),

    /// Failed to parse an incoming MQTT payload as JSON.
    #[error("failed to parse MQTT payload")]
    PayloadParse(#[source] serde_json::Error),

    /// A message arrived on a topic the bridge does not handle.
    #[error("unexpected topic `{0}`")]
    UnknownTopic(String),

    /// A step message carried neither a task index nor a failure.
    #[error("step message needs a taskIndex or success = false")]
    IncompleteStep,

    /// A domain-level error (validation, not-found, etc.).
    #[error("domain error")]
    Domain(#[source] TankHubError),
}

impl MqttError {
    /// Convert into a [`TankHubError`] for propagation across port boundaries.
    ///
    /// Transport failures become [`TankHubError::Dispatch`].
    pub fn into_domain(self) -> TankHubError {
        match self {
            Self::Domain(err) => err,
            other => TankHubError::dispatch(other),
        }
    }
}

impl From<MqttError> for TankHubError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
