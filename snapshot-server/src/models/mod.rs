pub mod policy;
pub mod source;
