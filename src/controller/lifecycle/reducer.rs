use crate::machine::Reducer;

use super::intent::SessionIntent;
use super::state::SessionState;

/// Lifecycle transitions. Intents that do not apply to the current state
/// leave it unchanged.
pub struct SessionReducer;

impl Reducer for SessionReducer {
    type State = SessionState;
    type Intent = SessionIntent;

    fn reduce(state: Self::State, intent: Self::Intent) -> Self::State {
        use SessionState::*;

        match (state, intent) {
            (Disposed, _) | (_, SessionIntent::Dispose) => Disposed,

            (Uninitialized, SessionIntent::ConfigureIo) => IoConfigured,
            (IoConfigured, SessionIntent::Engage) => Ready,
            (Ready, SessionIntent::ExecutionStarted) => Running,
            (Running, SessionIntent::ExecutionEnded) => Ready,

            (other, _) => other,
        }
    }
}
