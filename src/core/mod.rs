pub mod acquisition;
pub mod classifier;
pub mod decoder;
pub mod port_resolver;

pub use crate::domain::model::{Reading, StatusEvent, Verdict};
pub use crate::domain::ports::{DeviceOpener, FrameParser, PortEnumerator, ReadingSink};
pub use crate::utils::error::Result;
