pub mod codes;
pub mod domain;
pub mod error;
pub mod protocol;
