pub mod declarations;
pub mod enums;
pub mod form;
pub mod queue;

pub use declarations::*;
pub use enums::*;
pub use form::*;
pub use queue::*;
