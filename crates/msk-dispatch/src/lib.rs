//! msk-dispatch
//!
//! Time-ordered dispatch of calendar transitions. A [`Dispatcher`] keeps one
//! pending transition per registered targeted calendar instance and hands
//! them out in order to a pull-based poller.

mod dispatcher;

pub use dispatcher::Dispatcher;
