pub mod chain;
pub mod error;
pub mod execution;
pub mod step;
pub mod token;
pub mod transaction;

pub use chain::*;
pub use error::*;
pub use execution::*;
pub use step::*;
pub use token::*;
pub use transaction::*;
