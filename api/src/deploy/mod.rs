//! Deployment lifecycle

pub mod fsm;
pub mod mapper;
