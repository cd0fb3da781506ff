pub mod factory;
pub mod provider;
