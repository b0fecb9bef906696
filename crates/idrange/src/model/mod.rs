mod batch;
mod identifier;
mod ids;
mod interval;
mod owner;
mod state;

pub use batch::*;
pub use identifier::*;
pub use ids::*;
pub use interval::*;
pub use owner::*;
pub use state::*;

pub(crate) use interval::parse_digits;
