//! Unidirectional state-machine primitives.
//!
//! ```text
//! Intent ──→ Reducer ──→ State
//!    ↑                     │
//!    └─────── caller ──────┘
//! ```
//!
//! - **State**: value describing where a lifecycle currently is
//! - **Intent**: an event that may move it
//! - **Reducer**: pure function from (state, intent) to the next state

mod intent;
mod reducer;
mod state;

pub use intent::Intent;
pub use reducer::Reducer;
pub use state::State;
