pub mod catalog;
pub mod error;
pub mod executor;
pub mod hardware;
pub mod index;
pub mod models;
pub mod notifications;
pub mod orchestrator;
pub mod ownership;
pub mod planner;
pub mod sound;
pub mod transfer_engine;
pub mod verifier;

pub use error::SyncError;
pub use executor::TransferExecutor;
pub use hardware::{DeviceHint, MountCandidate, MountResolver};
pub use models::{MountPoint, TransferMode, TransferOutcome, TransferReport, TransferSummary};
pub use orchestrator::{Orchestrator, RunReport};
pub use ownership::{FileOwner, get_archive_owner};
