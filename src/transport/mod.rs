//! Packet intake
//!
//! Socket I/O lives outside this crate. A transport reads datagrams and
//! pushes them into a [`DeliveryWorker`] channel; the worker hands each one
//! to the session router on its own tokio task.

pub mod dispatcher;

pub use dispatcher::{DeliveryCounters, DeliveryWorker, InboundPacket};
