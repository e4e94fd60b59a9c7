//! Library crate for teamfinder-back: contact requests between players and teams,
//! and the conversations opened once a request is accepted.

pub mod auth;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;
