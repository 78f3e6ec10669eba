//! Session lifecycle.
//!
//! - `state.rs` - where the session is (Uninitialized → IoConfigured → Ready ⇄ Running → Disposed)
//! - `intent.rs` - events that move it
//! - `reducer.rs` - transitions (pure, no side effects)

mod intent;
mod reducer;
mod state;

pub use intent::SessionIntent;
pub use reducer::SessionReducer;
pub use state::SessionState;
