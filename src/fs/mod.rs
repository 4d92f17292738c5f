pub mod backend;
pub mod dir;
pub mod ftp;
pub mod local;
pub mod memory;

pub use backend::{BackendType, RemoteBackend};
pub use dir::DirBackend;
pub use ftp::{FtpBackend, FtpSettings};
pub use local::{LocalFs, LocalStore};
pub use memory::MemoryBackend;
