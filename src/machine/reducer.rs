use super::intent::Intent;
use super::state::State;

/// The only place state transitions happen.
///
/// Side effects belong to the caller around the dispatch; `reduce` must
/// stay a pure function `(State, Intent) -> State`.
pub trait Reducer {
    type State: State;
    type Intent: Intent;

    fn reduce(state: Self::State, intent: Self::Intent) -> Self::State;
}
