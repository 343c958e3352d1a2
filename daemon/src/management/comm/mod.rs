pub use logs::{FsLogSource, LogSource};
pub use process::{ProcessControl, SystemdControl};

mod logs;
mod process;
