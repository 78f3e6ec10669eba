use crate::machine::State;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    IoConfigured,
    Ready,
    /// A top-level unit is executing; interrupts are delivered.
    Running,
    Disposed,
}

impl SessionState {
    /// I/O has been set up and the session is not disposed.
    pub fn is_usable(self) -> bool {
        matches!(
            self,
            SessionState::IoConfigured | SessionState::Ready | SessionState::Running
        )
    }
}

impl State for SessionState {}
