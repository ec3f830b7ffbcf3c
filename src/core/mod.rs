pub mod config;
pub mod earley;
pub mod environment;
pub mod generator;
pub mod grammar;
pub mod phonotactics;
