//! Action vocabulary and executor (§4.G): the tagged `ActionKind` a matched rule may carry, and
//! the background worker that drains queued actions off the hot path.

pub mod action;
pub mod dispatcher;

pub use action::{ActionKind, ExternalOp, VariableOp};
pub use dispatcher::{dispatch, ActionExecutor, ExecutorContext, ExternalActionHost, QueuedAction, SequenceInjector};
