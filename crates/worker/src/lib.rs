//! Worker runtime primitives shared by the playpen crates.
//!
//! * [`spawn`]: classified task spawning on the ambient (or fallback) tokio runtime
//! * [`SequenceClock`]: monotonic tokens for discarding superseded async results
//! * [`Debouncer`]: quiescence-window scheduling with cancel-on-reschedule
//! * [`message_channel`]: paired [`MessagePort`]s carrying structured JSON messages

mod class;
mod debounce;
mod port;
mod sequence;
mod spawn;

pub use class::TaskClass;
pub use debounce::Debouncer;
pub use port::{MessagePort, PortClosed, PortReceiver, PortSender, message_channel};
pub use sequence::SequenceClock;
pub use spawn::spawn;
pub use tokio_util::sync::CancellationToken;
