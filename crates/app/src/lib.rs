pub mod auth;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod stores;
pub mod telemetry;

pub use auth::{AuthSnapshot, AuthState};
pub use error::AppError;
pub use orchestrator::Orchestrator;
pub use session::{Session, SessionStores};
pub use stores::TracingStores;
