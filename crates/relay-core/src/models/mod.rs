pub mod campaign;
pub mod stage;

pub use campaign::*;
pub use stage::*;
