//! Broker topology names

/// Direct exchange shared by commands and results
pub const EXCHANGE: &str = "blacktree.direct";

/// Queue the workers consume commands from
pub const COMMAND_QUEUE: &str = "execute.queue";

/// Routing key binding the command queue to the exchange
pub const COMMAND_ROUTING_KEY: &str = "worker.execute";

/// Queue the API consumes worker results from
pub const RESULT_QUEUE: &str = "api.result";

/// Routing key binding the result queue to the exchange
pub const RESULT_ROUTING_KEY: &str = "status.queue";

/// A queue and the routing key it is bound with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub queue: &'static str,
    pub routing_key: &'static str,
}

/// Every queue binding declared on the exchange
pub const BINDINGS: [Binding; 2] = [
    Binding {
        queue: COMMAND_QUEUE,
        routing_key: COMMAND_ROUTING_KEY,
    },
    Binding {
        queue: RESULT_QUEUE,
        routing_key: RESULT_ROUTING_KEY,
    },
];
