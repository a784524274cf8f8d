pub mod advertisement;
pub mod models;
pub mod operation;
pub mod registry;
pub mod settings;
