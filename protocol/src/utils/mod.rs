pub use encoding::*;

mod encoding;
