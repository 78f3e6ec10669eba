/// Marker trait for events fed to a reducer.
pub trait Intent: Send + 'static {}
