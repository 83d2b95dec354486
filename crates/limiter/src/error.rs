use thiserror::Error;

#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("response not produced before deadline")]
    RequestTimeout,
}
