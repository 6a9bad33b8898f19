use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(BlockId);

/// One block of a block-structured document.
///
/// Mirrors the editor's block shape: the `type` discriminator, free-form
/// `props`, inline `content` (string or rich inline array) and nested
/// `children`. Comparison is structural, which is what echo suppression relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BlockId>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            props: Map::new(),
            content: Value::Null,
            children: Vec::new(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new("paragraph").with_content(Value::String(text.into()))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(BlockId(id.into()));
        self
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }
}

pub type DocumentBlocks = Vec<Block>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportProtocol {
    #[default]
    #[serde(rename = "ws", alias = "socket")]
    Socket,
    #[serde(rename = "none", other)]
    None,
}

impl TransportProtocol {
    pub fn is_socket(self) -> bool {
        matches!(self, Self::Socket)
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ws" | "socket" => Self::Socket,
            _ => Self::None,
        }
    }
}

fn default_group() -> String {
    "Custom".to_string()
}

/// A user-registered quick-insert command surfaced in the slash menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub title: String,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default)]
    pub subtext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub block: Block,
}

impl CommandEntry {
    pub fn new(title: impl Into<String>, block: Block) -> Self {
        Self {
            title: title.into(),
            group: default_group(),
            aliases: BTreeSet::new(),
            subtext: String::new(),
            icon: None,
            block,
        }
    }
}
