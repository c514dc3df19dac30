pub mod audit;
pub mod product;

pub use audit::*;
pub use product::*;
