//! External collaborators: the Adafruit IO HTTP API and DS18B20 probes.

pub mod adafruit;
pub mod ds18b20;
pub mod mock;
