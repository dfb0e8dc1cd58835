//! Builtin customer service tools
//!
//! Each tool has its own module. The order lookup is a trait so the order
//! service can be swapped out (tests use failing and panicking lookups).

pub mod create_ticket;
pub mod order_status;
pub mod system_status;
pub mod transfer;

pub use create_ticket::{generate_ticket_id, CreateTicketTool, Priority};
pub use order_status::{OrderLookup, OrderStatusTool, SimulatedOrderLookup, ORDER_STATUS_FALLBACK};
pub use system_status::SystemStatusTool;
pub use transfer::{Department, TransferTool};
