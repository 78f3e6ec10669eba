//! Messages crossing the build worker boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fs::FileTree;

/// Bundle name → version.
pub type Packages = BTreeMap<String, String>;

/// Host → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostMessage {
    Build {
        files: FileTree,
        #[serde(rename = "scriptName")]
        script_name: String,
    },
}

/// Worker → host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BuilderMessage {
    /// Sent once, when the worker has enumerated its bundles.
    Packages { packages: Packages },
    /// One or more complete output lines.
    Output {
        #[serde(with = "crate::encoding::base64_bytes")]
        bytes: Vec<u8>,
    },
    /// The build finished, normally or by controlled exit.
    Result { code: i32, files: FileTree },
    /// The build failed.
    Error { error: String },
}

impl BuilderMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            BuilderMessage::Packages { .. } => "packages",
            BuilderMessage::Output { .. } => "output",
            BuilderMessage::Result { .. } => "result",
            BuilderMessage::Error { .. } => "error",
        }
    }

    /// `result` and `error` end a build.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuilderMessage::Result { .. } | BuilderMessage::Error { .. })
    }
}
