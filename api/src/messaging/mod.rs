pub mod broker;
pub mod consumer;
pub mod publisher;
pub mod topology;
