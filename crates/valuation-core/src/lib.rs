pub mod error;
pub mod industry;
pub mod money;
pub mod traits;
pub mod types;

pub use error::*;
pub use industry::*;
pub use money::*;
pub use traits::*;
pub use types::*;
