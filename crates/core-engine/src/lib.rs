//! Event Processor and supporting observability (§4.E, §4.H): the three-layer decode/classify/
//! encode pipeline, a lock-free latency ring buffer, and optional per-event journey logging.
//!
//! `EventProcessor` is the engine's single hot-path entry point; everything else in the daemon
//! (config loader, OS adapter, action executor) either feeds it or reacts to its output.

pub mod journey;
pub mod metrics;
pub mod processor;

pub use journey::{JourneyGate, JourneyObserver, JourneyRecord, TracingJourneyObserver};
pub use metrics::{LatencyRingBuffer, LatencyStats, RING_CAPACITY};
pub use processor::{EventProcessor, ProcessedEvent, ACTION_QUEUE_DROPS, DECODE_MISSES};
