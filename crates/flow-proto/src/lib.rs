pub mod event;
pub mod signal;

pub use event::{EventKind, JunctionEvent};
pub use signal::{Approach, Phase};
