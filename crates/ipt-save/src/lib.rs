pub mod error;
pub mod parser;
pub mod source;

pub use error::*;
pub use parser::*;
pub use source::*;

// iptables-save capture and counter-inclusive dump parsing
