pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod outcome;
pub mod recovery;
pub mod service;
pub mod state;
pub mod units;

#[cfg(test)]
pub(crate) mod testing;
