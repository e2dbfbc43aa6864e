use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("sensor error: {0}")]
    Sensor(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("state lock poisoned")]
    StateLock,
    #[error("detector lock poisoned")]
    DetectorLock,
}
