pub mod archive;
pub mod cache;
pub mod file;
pub mod timer;

pub use archive::{ARCHIVE_FILE, Archive};
pub use cache::TableCache;
pub use file::StorageFile;
pub use timer::{IdleTimer, TimerFlow};
