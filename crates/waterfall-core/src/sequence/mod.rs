pub mod base;
pub mod rules;
pub mod step;
pub mod strategy;
