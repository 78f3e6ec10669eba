//! Build pipeline.
//!
//! A dedicated worker thread owns the command table and runs build scripts
//! one at a time. The host talks to it only through channels carrying
//! [`HostMessage`] and [`BuilderMessage`]:
//!
//! ```text
//! Builder ──Build──→ worker ──Packages/Output*/Result|Error──→ Builder
//! ```

mod command;
mod external;
mod host;
mod line_buffer;
mod protocol;
mod script;
mod worker;

pub use command::{Bundle, Command, CommandError, CommandIo, CommandRegistry};
pub use external::{registry_from_config, ExternalCommand};
pub use host::{BuildError, BuildResult, Builder, QueuedBuilder};
pub use line_buffer::LineBuffer;
pub use protocol::{BuilderMessage, HostMessage, Packages};
pub use script::{Script, ScriptCommand, ScriptError};
