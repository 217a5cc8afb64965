pub mod run;
pub mod sequence;
pub mod timeline;
pub mod variants;
