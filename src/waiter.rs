use std::pin::Pin;
use std::time::Instant;

/// Scheduling capability for the async surface: how a stream sleeps until
/// a deadline while a refill races it. Supplied by the caller so the
/// library stays independent of any particular runtime.
pub trait Waiter {
    fn wait_until(&self, deadline: Instant) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}
