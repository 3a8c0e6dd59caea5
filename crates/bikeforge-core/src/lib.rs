pub mod catalog;
pub mod config_manager;
pub mod error;
pub mod specification;

pub use catalog::*;
pub use config_manager::*;
pub use error::*;
pub use specification::*;
