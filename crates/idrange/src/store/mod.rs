mod config;
mod interface;
mod memory;

pub use config::*;
pub use interface::*;
pub use memory::*;
