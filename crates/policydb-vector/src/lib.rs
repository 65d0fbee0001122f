//! Vector index backends behind the `IndexBackend` trait.

pub mod factory;
pub mod flat;
#[cfg(feature = "lance")]
pub mod lance;
pub mod managed;
pub mod similarity;

pub use factory::open_backend;
pub use flat::FlatIndex;
#[cfg(feature = "lance")]
pub use lance::LanceIndex;
pub use managed::ManagedIndex;
