//! ostinato-services: Runtime plumbing around the core stage

pub mod conductor;
pub mod config;
pub mod logging;
pub mod sample_library;
pub mod sink;

pub use conductor::{Conductor, ConductorError};
pub use config::{config_path, load_config, save_config, ConductorConfig};
pub use sample_library::{SampleLibrary, SampleLibraryError};
pub use sink::ChannelSink;
