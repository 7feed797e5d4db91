pub mod errors;
pub mod table;
pub mod parameters;
pub mod targets;
pub mod objective;
pub mod searchspace;
pub mod metadata;
pub mod matching;

pub use errors::*;
pub use table::*;
pub use parameters::*;
pub use targets::*;
pub use objective::*;
pub use searchspace::*;
pub use metadata::*;
pub use matching::*;
