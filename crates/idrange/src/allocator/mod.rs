mod admin;
mod cancel;
mod collab;
mod config;
mod delete;
mod engine;
mod issue;
#[cfg(test)]
mod tests;

pub use collab::*;
pub use config::*;
pub use engine::*;
pub use issue::*;
