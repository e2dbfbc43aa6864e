//! BH1750 ambient-light sensor on the Raspberry Pi I2C bus.

use crate::error::AppError;
use crate::sensor::{LightSensorDriver, LightSensorFactory};
use rppal::i2c::I2c;

const CMD_POWER_ON: u8 = 0x01;
const CMD_CONTINUOUS_HIGH_RES: u8 = 0x10;
// Datasheet measurement accuracy factor for the default MTreg.
const COUNTS_PER_LUX: f64 = 1.2;

#[derive(Debug, Clone, Copy)]
pub struct Bh1750Factory {
    bus: u8,
    address: u8,
}

impl Bh1750Factory {
    pub fn new(bus: u8, address: u8) -> Self {
        Self { bus, address }
    }
}

impl LightSensorFactory for Bh1750Factory {
    type Driver = Bh1750Sensor;

    fn open(&mut self) -> Result<Self::Driver, AppError> {
        let mut i2c = I2c::with_bus(self.bus).map_err(|err| AppError::I2c(err.to_string()))?;
        i2c.set_slave_address(u16::from(self.address))
            .map_err(|err| AppError::I2c(err.to_string()))?;
        let mut sensor = Bh1750Sensor { i2c };
        sensor.command(CMD_POWER_ON)?;
        sensor.command(CMD_CONTINUOUS_HIGH_RES)?;
        Ok(sensor)
    }
}

pub struct Bh1750Sensor {
    i2c: I2c,
}

impl Bh1750Sensor {
    fn command(&mut self, opcode: u8) -> Result<(), AppError> {
        self.i2c
            .write(&[opcode])
            .map_err(|err| AppError::I2c(format!("command {opcode:#04x}: {err}")))?;
        Ok(())
    }
}

impl LightSensorDriver for Bh1750Sensor {
    fn read_lux(&mut self) -> Result<f64, AppError> {
        let mut buffer = [0u8; 2];
        let read = self
            .i2c
            .read(&mut buffer)
            .map_err(|err| AppError::I2c(err.to_string()))?;
        if read != buffer.len() {
            return Err(AppError::Sensor(format!(
                "short read from BH1750: {read} of {} bytes",
                buffer.len()
            )));
        }
        Ok(raw_to_lux(buffer))
    }
}

fn raw_to_lux(buffer: [u8; 2]) -> f64 {
    f64::from(u16::from_be_bytes(buffer)) / COUNTS_PER_LUX
}
