pub mod error;
pub mod rubric;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::*;
pub use rubric::*;
pub use traits::*;
pub use types::*;
