//! Windowed, order-preserving message streams.

mod window;

pub use window::{Phase, StreamReader, StreamSection, WindowedStream};
