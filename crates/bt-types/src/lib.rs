pub mod catalog;
pub mod errors;
pub mod params;
pub mod run;
pub mod task;

pub use catalog::*;
pub use errors::*;
pub use params::*;
pub use run::*;
pub use task::*;
