//! Commands published to the workers

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A command for a worker, discriminated by the `type` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// Clone the repository and build its image
    Build(BuildCommand),

    /// Start (or restart) the built container
    Trigger(TargetCommand),

    /// Remove the container and image from the worker
    Delete(TargetCommand),

    /// Halt the running container
    Stop(TargetCommand),
}

/// Command discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Build,
    Trigger,
    Delete,
    Stop,
}

impl CommandKind {
    /// Value of the `type` field on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Build => "build",
            CommandKind::Trigger => "trigger",
            CommandKind::Delete => "delete",
            CommandKind::Stop => "stop",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    pub fn trigger(deployment_id: Uuid) -> Self {
        Command::Trigger(TargetCommand { deployment_id })
    }

    pub fn delete(deployment_id: Uuid) -> Self {
        Command::Delete(TargetCommand { deployment_id })
    }

    pub fn stop(deployment_id: Uuid) -> Self {
        Command::Stop(TargetCommand { deployment_id })
    }

    /// Deployment the command targets
    pub fn deployment_id(&self) -> Uuid {
        match self {
            Command::Build(build) => build.deployment_id,
            Command::Trigger(target) | Command::Delete(target) | Command::Stop(target) => {
                target.deployment_id
            }
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Build(_) => CommandKind::Build,
            Command::Trigger(_) => CommandKind::Trigger,
            Command::Delete(_) => CommandKind::Delete,
            Command::Stop(_) => CommandKind::Stop,
        }
    }

    /// Encode as a UTF-8 JSON payload
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a UTF-8 JSON payload
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Command that only names its deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCommand {
    pub deployment_id: Uuid,
}

/// Everything a worker needs to clone and build a deployment
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCommand {
    pub deployment_id: Uuid,

    /// Owner's source-control token, injected into the clone URL by the worker
    pub token: String,

    pub repository: String,

    pub branch: String,

    #[serde(rename = "dockerFilePath")]
    pub dockerfile_path: String,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub compose_file_path: Option<String>,

    pub context_dir: String,

    /// Port the container listens on, a decimal string on the wire
    #[serde(default, with = "port_string", skip_serializing_if = "Option::is_none")]
    pub port_number: Option<u16>,

    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildCommand")
            .field("deployment_id", &self.deployment_id)
            .field("token", &"[REDACTED]")
            .field("repository", &self.repository)
            .field("branch", &self.branch)
            .field("dockerfile_path", &self.dockerfile_path)
            .field("compose_file_path", &self.compose_file_path)
            .field("context_dir", &self.context_dir)
            .field("port_number", &self.port_number)
            .field("created_at", &self.created_at)
            .finish()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

mod port_string {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    pub fn serialize<S>(value: &Option<u16>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(port) => serializer.serialize_str(&port.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawPort>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawPort::Number(port)) => Ok(Some(port)),
            Some(RawPort::Text(text)) if text.trim().is_empty() => Ok(None),
            Some(RawPort::Text(text)) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| D::Error::custom(format!("invalid port number {text:?}: {e}"))),
        }
    }
}
