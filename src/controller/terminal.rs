use std::sync::Arc;

use async_trait::async_trait;

use crate::pty::PtySlave;

use super::interpreter::InputDevice;

/// The terminal a session is wired to.
#[async_trait]
pub trait TerminalIo: Send + Sync {
    async fn read(&self) -> Vec<u8>;
    fn write(&self, bytes: &[u8]) -> usize;
    fn columns(&self) -> u16;
}

#[async_trait]
impl TerminalIo for PtySlave {
    async fn read(&self) -> Vec<u8> {
        PtySlave::read(self).await
    }

    fn write(&self, bytes: &[u8]) -> usize {
        PtySlave::write(self, bytes)
    }

    fn columns(&self) -> u16 {
        PtySlave::columns(self)
    }
}

/// Exposes a terminal's read side as an interpreter input device.
pub(crate) struct TerminalInput(pub Arc<dyn TerminalIo>);

#[async_trait]
impl InputDevice for TerminalInput {
    async fn read(&self) -> Vec<u8> {
        self.0.read().await
    }
}
