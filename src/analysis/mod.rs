pub mod config;
pub mod desaturation;
pub mod summary;

pub use config::AnalysisConfig;
pub use desaturation::{detect_desaturations, DesaturationEvent};
pub use summary::{summarize_session, SessionSummary};
