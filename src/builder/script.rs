//! Build scripts: `{"commands": [[name, arg, ...], ...]}`.

use serde::Deserialize;
use thiserror::Error;

use crate::fs::FileTree;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Script '{name}' is not present in the file tree")]
    Missing { name: String },

    #[error("Script '{name}' is malformed: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Script '{name}' has an empty command at position {index}")]
    EmptyCommand { name: String, index: usize },
}

#[derive(Deserialize)]
struct ScriptFile {
    commands: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCommand {
    pub name: String,
    pub args: Vec<String>,
}

impl ScriptCommand {
    /// `+ name arg1 arg2\n`, as echoed before the command runs.
    pub fn trace_line(&self) -> Vec<u8> {
        let mut line = format!("+ {}", self.name);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push('\n');
        line.into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub commands: Vec<ScriptCommand>,
}

impl Script {
    /// Read and parse the script stored at `name` in `files`.
    pub fn from_tree(files: &FileTree, name: &str) -> Result<Self, ScriptError> {
        let bytes = files.get(name).ok_or_else(|| ScriptError::Missing {
            name: name.to_string(),
        })?;
        Self::parse(name, bytes)
    }

    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self, ScriptError> {
        let file: ScriptFile =
            serde_json::from_slice(bytes).map_err(|source| ScriptError::Malformed {
                name: name.to_string(),
                source,
            })?;
        let commands = file
            .commands
            .into_iter()
            .enumerate()
            .map(|(index, mut words)| {
                if words.is_empty() {
                    return Err(ScriptError::EmptyCommand {
                        name: name.to_string(),
                        index,
                    });
                }
                let command = words.remove(0);
                Ok(ScriptCommand {
                    name: command,
                    args: words,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { commands })
    }
}
