pub mod client;
pub mod ha;
