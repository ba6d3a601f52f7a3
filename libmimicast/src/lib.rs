//! Mimicast - an autonomous posting agent
//!
//! The agent reads the recent posts of a set of reference accounts, asks a
//! completion provider for a new post in their voice and publishes it from
//! its own account on a fixed schedule.

pub mod accounts;
pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod platforms;
pub mod poster;
pub mod scheduling;
pub mod session;

// Re-export commonly used types
pub use accounts::{AccountDirectory, AccountRef, Corpus};
pub use agent::{Agent, CycleError, CycleOutcome, CycleStage, Scheduler};
pub use auth::{AuthManager, AuthState};
pub use config::{Config, Credentials};
pub use error::{MimicastError, Result};
pub use scheduling::{Schedule, SchedulePolicy};
pub use session::{Session, SessionStore};
