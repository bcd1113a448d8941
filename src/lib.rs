pub mod config;
pub mod error;
pub mod io_struct;
pub mod prompt;
pub mod relay_state;
pub mod server;
pub mod sse;
pub mod storage;
pub mod strategy_mode;
pub mod upload;
pub mod upstream;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use io_struct::{GenerationRequest, ProgressEvent};
pub use relay_state::RelayState;
