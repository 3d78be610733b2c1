pub mod constants;
pub mod embedding;
pub mod error;
pub mod source;
pub mod text;
