use thiserror::Error;

#[derive(Debug, Error)]
pub enum DragError {
    /// The element is neither an `<svg>` nor nested inside one.
    #[error("element is not inside an <svg> root")]
    NoOwnerSvg,
    #[error("owning <svg> has no screen transform")]
    MissingScreenCtm,
    #[error("screen transform of the owning <svg> is not invertible")]
    SingularTransform,
    #[error("element has no layout box")]
    NoLayoutBox,
    #[error("no element with id `{0}`")]
    UnknownElement(String),
    #[error("invalid markup: {0}")]
    Markup(String),
    #[error("host call failed: {0}")]
    Host(String),
}

pub type Result<T> = std::result::Result<T, DragError>;
