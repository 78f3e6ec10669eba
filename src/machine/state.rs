/// Marker trait for reducer state.
///
/// States are plain values: cloned to snapshot, compared to detect change.
pub trait State: Clone + PartialEq + Default + Send + 'static {}
