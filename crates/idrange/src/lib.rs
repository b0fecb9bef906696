#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod allocator;
mod checksum;
mod error;
mod model;
mod namespace;
mod pool;
mod store;
mod time;
mod validate;

pub use crate::allocator::*;
pub use crate::checksum::*;
pub use crate::error::*;
pub use crate::model::*;
pub use crate::namespace::*;
pub use crate::pool::*;
pub use crate::store::*;
pub use crate::time::*;
pub use crate::validate::*;
