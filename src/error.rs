use thiserror::Error;

#[derive(Error, Debug)]
pub enum StencilError {
    #[error("field size must be at least one cell")]
    EmptyField,

    #[error("thread count must be at least one")]
    ZeroThreads,

    #[error("requested ghost width must be at least one cell")]
    ZeroGhostWidth,

    #[error("ghost width {requested} exceeds the safe maximum {safe} for partitions of width {min_width}")]
    GhostWidthUnsafe {
        requested: usize,
        safe: usize,
        min_width: usize,
    },

    #[error("transition failed in partition {partition} at generation {generation}: {source}")]
    Transition {
        partition: usize,
        generation: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("worker for partition {partition} panicked: {message}")]
    WorkerPanicked { partition: usize, message: String },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StencilError>;
