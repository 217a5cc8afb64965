pub mod registry;
pub mod variant;
