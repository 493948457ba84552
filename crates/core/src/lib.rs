pub mod config;
pub mod config_loader;
pub mod correlation;

pub use config::{
    AppConfig, PollConfig, ScraperConfig, SnapshotConfig, StoreConfig, TraderConfig, TwsConfig,
    UnderlyingConfig,
};
pub use config_loader::ConfigLoader;
pub use correlation::{
    poll_until_converged, recv_until, Completion, PollOutcome, PollSettings, RequestTable,
    Termination, WaitOutcome,
};
