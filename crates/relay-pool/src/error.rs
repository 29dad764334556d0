use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("request queue is full")]
    QueueFull,
}
