//! Buffer-pooled stream utilities.
//!
//! # Data Flow
//! ```text
//! caller (executor, soap, cli)
//!     → pool.rs (rent fixed-size scratch buffer, returned on drop)
//!     → stream.rs (copy / to-bytes / to-string in bounded chunks)
//!     → base64.rs (chunked decode through a pooled char buffer)
//! ```
//!
//! # Design Decisions
//! - Scratch buffers come in four size classes (16/32/64/80 KiB)
//! - A rented buffer always goes back to the pool when its guard drops,
//!   including early `?` returns and unwinding
//! - Destinations are pre-sized from a length hint when one is known
//! - Streams the caller passed in are never closed, except by
//!   `copy_stream_and_close`, which consumes its reader

pub mod base64;
pub mod pool;
pub mod stream;

pub use self::base64::{base64_decode_to_bytes, base64_encode};
pub use pool::{BufferPool, PooledBuffer};
pub use stream::{
    copy_stream, copy_stream_and_close, copy_stream_async, stream_to_bytes, stream_to_string,
    TextAccumulator,
};
