mod base;
mod encoding;
mod fetch;

pub use base::*;
pub use encoding::*;
pub use fetch::*;
