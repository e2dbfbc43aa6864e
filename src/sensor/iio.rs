//! Ambient-light sensors exposed through the Linux IIO sysfs interface.
//!
//! Phones and SBCs running mainline Linux publish processed illuminance as a
//! decimal lux value in `in_illuminance_input`.

use crate::error::AppError;
use crate::sensor::{LightSensorDriver, LightSensorFactory};
use std::path::{Path, PathBuf};

pub const DEFAULT_IIO_PATH: &str = "/sys/bus/iio/devices/iio:device0/in_illuminance_input";

#[derive(Debug, Clone)]
pub struct IioLightFactory {
    path: PathBuf,
}

impl IioLightFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LightSensorFactory for IioLightFactory {
    type Driver = IioLightSensor;

    fn open(&mut self) -> Result<Self::Driver, AppError> {
        let mut sensor = IioLightSensor {
            path: self.path.clone(),
        };
        // Read once so a missing sensor fails the subscription up front.
        sensor.read_lux()?;
        Ok(sensor)
    }
}

#[derive(Debug)]
pub struct IioLightSensor {
    path: PathBuf,
}

impl LightSensorDriver for IioLightSensor {
    fn read_lux(&mut self) -> Result<f64, AppError> {
        read_illuminance(&self.path)
    }
}

fn read_illuminance(path: &Path) -> Result<f64, AppError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| AppError::Sensor(format!("read {}: {err}", path.display())))?;
    parse_illuminance(&contents)
}

fn parse_illuminance(contents: &str) -> Result<f64, AppError> {
    let trimmed = contents.trim();
    trimmed
        .parse::<f64>()
        .map_err(|err| AppError::Sensor(format!("invalid illuminance value {trimmed:?}: {err}")))
}
