//! Batch dispatch of remote requests.
//!
//! Typed order parameters map onto [`RemoteRequest`]s; the
//! [`BatchDispatcher`] runs a collection of them on the task pool and hands
//! back a [`BatchResult`] whose entry `i` always belongs to input `i`.

mod batch;
pub mod request;

pub use batch::{BatchDispatcher, BatchEntry, BatchItemError, BatchResult};
pub use request::{
    BuyOrder, CancelOrder, EditOrder, IntoRemoteRequest, OrderType, RemoteRequest, SellOrder,
    Trigger,
};
