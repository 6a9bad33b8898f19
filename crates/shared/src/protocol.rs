use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    domain::{Block, CommandEntry, DocumentBlocks, TransportProtocol},
    error::DecodeError,
};

/// Raw `{type, payload}` message as posted by the host frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostEnvelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl HostEnvelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: Some(kind.into()),
            payload,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurePayload {
    #[serde(
        default,
        alias = "serverUrl",
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub server_address: Option<String>,
    #[serde(
        default,
        alias = "protocol",
        deserialize_with = "blank_protocol_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub transport_protocol: Option<TransportProtocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_content: Option<DocumentBlocks>,
}

// An empty string keeps the previous value, same as an omitted field.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|value| !value.trim().is_empty()))
}

fn blank_protocol_as_none<'de, D>(deserializer: D) -> Result<Option<TransportProtocol>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(blank_as_none(deserializer)?.map(|value| TransportProtocol::parse(&value)))
}

/// Host-originated requests understood by the gadget.
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    Configure(ConfigurePayload),
    GetContent,
    SetContent(DocumentBlocks),
    SetInitialContent(DocumentBlocks),
    RegisterSlashItem(CommandEntry),
    InsertBlock(Block),
}

impl HostRequest {
    pub const CONFIGURE: &'static str = "CONFIGURE";
    pub const GET_CONTENT: &'static str = "GET_CONTENT";
    pub const SET_CONTENT: &'static str = "SET_CONTENT";
    pub const SET_INITIAL_CONTENT: &'static str = "SET_INITIAL_CONTENT";
    pub const REGISTER_SLASH_ITEM: &'static str = "REGISTER_SLASH_ITEM";
    pub const INSERT_BLOCK: &'static str = "INSERT_BLOCK";

    pub fn decode(envelope: HostEnvelope) -> Result<Self, DecodeError> {
        let kind = match envelope.kind {
            Some(kind) if !kind.is_empty() => kind,
            _ => return Err(DecodeError::MissingType),
        };
        let payload = envelope.payload;

        let request = match kind.as_str() {
            Self::CONFIGURE => {
                // CONFIGURE without a payload keeps every field.
                if payload.is_null() {
                    Self::Configure(ConfigurePayload::default())
                } else {
                    Self::Configure(decode_payload(&kind, payload)?)
                }
            }
            Self::GET_CONTENT => Self::GetContent,
            Self::SET_CONTENT => Self::SetContent(decode_payload(&kind, payload)?),
            Self::SET_INITIAL_CONTENT => Self::SetInitialContent(decode_payload(&kind, payload)?),
            Self::REGISTER_SLASH_ITEM => Self::RegisterSlashItem(decode_payload(&kind, payload)?),
            Self::INSERT_BLOCK => Self::InsertBlock(decode_payload(&kind, payload)?),
            _ => return Err(DecodeError::UnknownType(kind)),
        };
        Ok(request)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configure(_) => Self::CONFIGURE,
            Self::GetContent => Self::GET_CONTENT,
            Self::SetContent(_) => Self::SET_CONTENT,
            Self::SetInitialContent(_) => Self::SET_INITIAL_CONTENT,
            Self::RegisterSlashItem(_) => Self::REGISTER_SLASH_ITEM,
            Self::InsertBlock(_) => Self::INSERT_BLOCK,
        }
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    kind: &str,
    payload: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|source| DecodeError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}

/// Gadget-originated messages posted back to the host frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostEvent {
    GadgetReady,
    ContentResponse(DocumentBlocks),
    InitialContentSet,
    SlashItemRegistered(String),
    ServerConnected,
    ContentUpdated(DocumentBlocks),
    Error(String),
}

/// JSON frames exchanged with the collaboration peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerFrame {
    ContentUpdate { content: DocumentBlocks },
    ContentSet { content: DocumentBlocks },
    BlockInserted { content: DocumentBlocks },
}

impl PeerFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContentUpdate { .. } => "CONTENT_UPDATE",
            Self::ContentSet { .. } => "CONTENT_SET",
            Self::BlockInserted { .. } => "BLOCK_INSERTED",
        }
    }
}
