//! 🧵 Workers: the ones who actually do the work while the Supervisor takes
//! all the credit in the sprint retro.
//!
//! Two kinds live here:
//! - [`SourceWorker`]: the producer. Pulls ids from the source, pushes them into
//!   the channel, completes the channel on the way out. Every way out.
//! - [`LookupWorker`]: a consumer. Drains the channel, looks each id up, writes
//!   down what happened. `N` of them share one receiver. 🦆

use tokio::task::JoinHandle;

mod lookup_worker;
mod source_worker;

pub(crate) use lookup_worker::LookupWorker;
pub(crate) use source_worker::SourceWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// `start` consumes the worker and spawns it. Whatever it reports back comes
/// through the `JoinHandle`; if it panics instead, the supervisor finds out there.
pub(crate) trait Worker {
    type Output: Send + 'static;

    fn start(self) -> JoinHandle<Self::Output>;
}
