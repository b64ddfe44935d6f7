//! Push streams: channels, cancellation handles and derived operators

pub mod channel;
mod ops;

pub use channel::{Channel, Subscription, Subscriptions, WeakChannel};
