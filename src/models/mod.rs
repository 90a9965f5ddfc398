mod download_log;
mod identity;
mod order;

pub use download_log::*;
pub use identity::*;
pub use order::*;
