/// Crate-wide result alias.
pub type MosaicResult<T> = Result<T, MosaicError>;

/// Errors surfaced by the compositor and its per-device collaborators.
///
/// The first three variants carry dispatch semantics and are matched on by
/// the compositor itself:
///
/// - [`MosaicError::DisplayChanged`] — the display topology underlying every
///   device record is stale. Never recoverable locally; forces the window
///   compositor into its recreate state.
/// - [`MosaicError::WrongSize`] — a present call disagreed with the backing
///   about its current dimensions. Recovered by a subsequent
///   `set_position`.
/// - [`MosaicError::Device`] — a single backing failed transiently (resize,
///   create, draw). Recovered per device by software fallback where the
///   policy allows it.
#[derive(thiserror::Error, Debug)]
pub enum MosaicError {
    /// The display topology underlying the device records is stale.
    #[error("display topology changed")]
    DisplayChanged,

    /// A present call disagreed with the backing about its dimensions.
    #[error("backing size does not match caller-reported size")]
    WrongSize,

    /// A single backing failed transiently.
    #[error("device error: {0}")]
    Device(String),

    /// A caller-supplied argument was rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// A backing could not allocate the resources it needed.
    #[error("out of resources: {0}")]
    OutOfResources(String),

    /// Any other collaborator failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MosaicError {
    /// A per-device transient failure.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// An invalid-argument failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// An out-of-resources failure.
    pub fn out_of_resources(msg: impl Into<String>) -> Self {
        Self::OutOfResources(msg.into())
    }

    /// True when the error signals a stale display topology.
    pub fn is_display_changed(&self) -> bool {
        matches!(self, Self::DisplayChanged)
    }

    /// True when the error signals a present-size disagreement.
    pub fn is_wrong_size(&self) -> bool {
        matches!(self, Self::WrongSize)
    }
}
