pub mod context;
pub mod domain;
pub mod logging;
pub mod recording;

pub use context::TestContext;
pub use recording::{RecordingStore, StoreCall};
