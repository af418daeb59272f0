pub mod approved;
pub mod demo;
pub mod status;
