pub mod attributes;
pub mod compile;
pub mod export;
