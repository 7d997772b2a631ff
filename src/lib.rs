//! NPVision - AI-generated study workspaces
//!
//! NPVision organizes a subject into a Unit/Chapter/Topic tree and fills
//! each topic with generated content: a visual (an HTML animation or a
//! JSON slide payload), a paged description and a multiple-choice quiz,
//! all produced by Gemini and extracted from free-form model output.

pub mod config;
pub mod extract;
pub mod gemini;
pub mod orchestrator;
pub mod prompt;
pub mod server;
pub mod workspace;

pub use config::Config;
pub use orchestrator::Orchestrator;
pub use workspace::{Topic, Workspace, WorkspaceStore};
