pub mod db;
pub mod goals;
pub mod macro_cycle;
pub mod models;
pub mod service;
pub mod trend;
pub mod weight_import;
