pub mod identify;
pub mod patterns;
pub mod toolkit;
pub mod util;

pub use identify::*;
pub use patterns::*;
pub use toolkit::*;
pub use util::*;
