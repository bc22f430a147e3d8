pub mod connections;
pub mod health;
pub mod system;
