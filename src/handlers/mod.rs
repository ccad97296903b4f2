pub mod data;
pub mod public;
pub mod tenant;
