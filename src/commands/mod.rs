mod config_cmd;
mod sample;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use sample::SampleCommand;
pub use sync_cmd::SyncCommand;
