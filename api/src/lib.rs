pub mod admission;
pub mod config;
pub mod connection;
pub mod routes;
pub mod shutdown;
pub mod startup;
