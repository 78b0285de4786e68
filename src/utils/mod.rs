pub mod jwt;
pub mod source;
