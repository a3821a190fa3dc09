pub mod system;
pub mod trading;

pub use system::*;
pub use trading::*;
