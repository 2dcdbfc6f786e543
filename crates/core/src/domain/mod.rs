pub mod call;
pub mod offer;
pub mod prompt;
