pub mod controller;
pub mod parser;
pub mod supervisor;

pub use controller::AcquisitionController;
pub use parser::{parse_line, RawSample, SampleError};
pub use supervisor::SupervisorState;
