pub mod core;
pub mod scanner;

pub use self::core::{UploadManager, UploadQueueState, UploadStatus, UploadTask};
pub use scanner::{join_remote, scan_local, LocalEntry};
