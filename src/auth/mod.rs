pub mod federation;
pub mod token;
