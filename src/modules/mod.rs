pub mod links;
pub mod provider;
