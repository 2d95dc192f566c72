//! Error types for flathit-core.

use thiserror::Error;

use crate::event::Stream;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the flattening pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// A fill-phase append would exceed the sized hit capacity of a stream.
    #[error("sizing plan overrun for {stream} stream: {attempted} hits exceed planned {planned}")]
    PlanOverrun {
        stream: Stream,
        planned: usize,
        attempted: usize,
    },

    /// The fill phase finished without consuming the sized capacity.
    #[error("sizing plan underrun for {stream} stream: wrote {written} of planned {planned} hits")]
    PlanUnderrun {
        stream: Stream,
        planned: usize,
        written: usize,
    },

    /// A fill-phase append would exceed the sized row count.
    #[error("row overrun: {attempted} rows exceed planned {planned}")]
    RowOverrun { planned: usize, attempted: usize },

    /// The fill phase finished short of the sized row count.
    #[error("row underrun: wrote {written} of planned {planned} rows")]
    RowUnderrun { planned: usize, written: usize },
}
