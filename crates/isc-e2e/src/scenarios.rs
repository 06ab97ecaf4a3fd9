//! End-to-end scenarios
//!
//! Every scenario runs requests through the pool and the VM exactly as a
//! chain would, then checks balances, registry and receipts.
