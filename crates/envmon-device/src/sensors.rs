//! Sensor handles and the ordered sensor array.

use envmon_core::Measurement;
use tracing::{debug, trace};

use crate::hal::SensorDriver;

/// One sensor with its last reading.
///
/// A failed read clears the last reading; the next scheduled sample is
/// the retry.
pub struct SensorHandle {
    name: String,
    driver: Box<dyn SensorDriver>,
    last: Measurement,
}

impl SensorHandle {
    pub fn new(name: impl Into<String>, driver: Box<dyn SensorDriver>) -> Self {
        Self {
            name: name.into(),
            driver,
            last: Measurement::UNKNOWN,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take a reading and return it.
    pub fn measure(&mut self) -> Measurement {
        self.last = match self.driver.read() {
            Ok(measurement) => {
                trace!(sensor = %self.name, ?measurement, "sensor read");
                measurement
            }
            Err(e) => {
                debug!(sensor = %self.name, error = %e, "sensor read failed");
                Measurement::UNKNOWN
            }
        };
        self.last
    }

    pub fn temperature(&self) -> Option<f32> {
        self.last.temperature
    }

    pub fn humidity(&self) -> Option<f32> {
        self.last.humidity
    }
}

/// Sensors in their fixed configuration order.
#[derive(Default)]
pub struct SensorArray {
    sensors: Vec<SensorHandle>,
}

impl SensorArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sensor; its index is the current length.
    pub fn push(&mut self, name: impl Into<String>, driver: Box<dyn SensorDriver>) -> usize {
        self.sensors.push(SensorHandle::new(name, driver));
        self.sensors.len() - 1
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SensorHandle> {
        self.sensors.get(index)
    }

    /// Measure every sensor, in order.
    pub fn sample_all(&mut self) -> Vec<Measurement> {
        self.sensors.iter_mut().map(SensorHandle::measure).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SensorError;
    use pretty_assertions::assert_eq;

    /// Replays a fixed script of results, then keeps failing.
    struct ScriptedSensor {
        script: Vec<Result<Measurement, ()>>,
    }

    impl SensorDriver for ScriptedSensor {
        fn read(&mut self) -> Result<Measurement, SensorError> {
            if self.script.is_empty() {
                return Err(SensorError::NoResponse);
            }
            self.script.remove(0).map_err(|_| SensorError::NoResponse)
        }
    }

    #[test]
    fn test_failed_read_degrades_to_unknown() {
        let mut handle = SensorHandle::new(
            "dht",
            Box::new(ScriptedSensor {
                script: vec![Ok(Measurement::new(21.0, 40.0)), Err(())],
            }),
        );

        assert_eq!(handle.measure(), Measurement::new(21.0, 40.0));
        assert_eq!(handle.temperature(), Some(21.0));

        assert_eq!(handle.measure(), Measurement::UNKNOWN);
        assert_eq!(handle.temperature(), None);
        assert_eq!(handle.humidity(), None);
    }

    #[test]
    fn test_sample_all_keeps_order() {
        let mut array = SensorArray::new();
        assert_eq!(
            array.push(
                "a",
                Box::new(ScriptedSensor {
                    script: vec![Ok(Measurement::new(22.0, 55.0))],
                }),
            ),
            0
        );
        assert_eq!(array.push("b", Box::new(ScriptedSensor { script: vec![] })), 1);

        assert_eq!(
            array.sample_all(),
            vec![Measurement::new(22.0, 55.0), Measurement::UNKNOWN]
        );
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(1).map(SensorHandle::name), Some("b"));
    }
}
