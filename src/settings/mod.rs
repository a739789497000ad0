pub mod config;

pub use config::{
    AliDriveConfig, Config, DEFAULT_ROOT_FOLDER_ID, MAX_TRANSFERS, MIN_TRANSFERS,
};
