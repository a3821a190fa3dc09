pub mod analysis;
pub mod market;
pub mod order;
pub mod portfolio;
pub mod signal;

pub use analysis::*;
pub use market::*;
pub use order::*;
pub use portfolio::*;
pub use signal::*;
