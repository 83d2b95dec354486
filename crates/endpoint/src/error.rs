use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid endpoint syntax: {0:?}")]
    InvalidSyntax(String),

    #[error("no endpoints available after health filtering")]
    EndpointGroup,
}
