use std::fmt;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::dto::{Reading, Slot};
use crate::error::ProcessingError;

pub const FAHRENHEIT_SCALE: f64 = 1.8;
pub const FAHRENHEIT_OFFSET: f64 = 32.0;
pub const KPA_PER_PSI: f64 = 6.895;

/// Counters collected by [`StreamProcessor::relay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub forwarded: u64,
    pub filtered: u64,
    pub failed: u64,
}

impl fmt::Display for RelayStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f,
               "{} received, {} forwarded, {} filtered, {} failed",
               self.received,
               self.forwarded,
               self.filtered,
               self.failed)
    }
}

pub trait StreamProcessor<I, O> {
    ///
    /// Handles one message. `Ok(None)` means the message is dropped on purpose.
    ///
    fn process(&self, input: I) -> Result<Option<O>, ProcessingError>;

    ///
    /// Send messages from the input channel to the output channel until
    /// either side hangs up. A message that fails to process is logged and
    /// dropped.
    ///
    fn relay(&self, input: Receiver<I>, output: SyncSender<O>, max_timeout: Duration) -> RelayStats {
        let mut stats = RelayStats::default();
        loop {
            match input.recv_timeout(max_timeout) {
                Ok(i) => {
                    stats.received += 1;
                    match self.process(i) {
                        Ok(Some(o)) => {
                            if output.send(o).is_err() {
                                warn!("Output channel closed, stopping relay");
                                break;
                            }
                            stats.forwarded += 1;
                        }
                        Ok(None) => stats.filtered += 1,
                        Err(e) => {
                            stats.failed += 1;
                            error!("Could not process message: {}", e);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    info!("No data received within {:?}. {}", max_timeout, stats);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Input channel closed");
                    break;
                }
            }
        }
        stats
    }
}

pub trait DataSink<T> {
    type Error: fmt::Display;

    ///
    /// Delivers a single item to the destination.
    ///
    fn send(&self, item: T) -> Result<(), Self::Error>;

    ///
    /// Drain the input channel into the sink. Returns how many items were
    /// delivered once all senders are gone.
    ///
    fn relay(&self, input: Receiver<T>) -> u64 {
        let mut delivered = 0;
        for item in input.iter() {
            match self.send(item) {
                Ok(()) => delivered += 1,
                Err(e) => error!("Could not deliver message: {}", e),
            }
        }
        delivered
    }
}

/// True when temperature, humidity and pressure all carry a value. A key that
/// is missing counts the same as `null`.
pub fn is_complete(reading: &Reading) -> bool {
    reading.temperature.value().is_some() &&
    reading.humidity.value().is_some() &&
    reading.pressure.value().is_some()
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * FAHRENHEIT_SCALE + FAHRENHEIT_OFFSET
}

pub fn kpa_to_psi(kpa: f64) -> f64 {
    kpa / KPA_PER_PSI
}

fn converted(field: &'static str, slot: &Slot<f64>, unit: fn(f64) -> f64) -> Result<Slot<f64>, ProcessingError> {
    match slot.value() {
        Some(&value) => {
            let out = unit(value);
            if !out.is_finite() {
                return Err(ProcessingError::OutOfRange { field: field, value: value });
            }
            Ok(Slot::Present(out))
        }
        None => Ok(Slot::Absent),
    }
}

///
/// Builds the outbound reading: `time` and `profile_name` as they came in,
/// temperature in Fahrenheit, pressure in psi. Measurements without a value
/// are left out. Fails if a converted value overflows, since JSON has no
/// way to carry it.
///
pub fn convert(reading: &Reading) -> Result<Reading, ProcessingError> {
    Ok(Reading {
        time: reading.time.clone(),
        profile_name: reading.profile_name.clone(),
        humidity: reading.humidity.present(),
        temperature: converted("temperature", &reading.temperature, celsius_to_fahrenheit)?,
        pressure: converted("pressure", &reading.pressure, kpa_to_psi)?,
    })
}

/// Decodes raw payloads, drops incomplete readings and encodes the converted
/// ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadingProcessor;

impl ReadingProcessor {
    pub fn new() -> ReadingProcessor {
        ReadingProcessor
    }
}

impl StreamProcessor<Vec<u8>, Vec<u8>> for ReadingProcessor {
    fn process(&self, input: Vec<u8>) -> Result<Option<Vec<u8>>, ProcessingError> {
        let reading = Reading::from_slice(&input)?;
        if !is_complete(&reading) {
            debug!("Dropping incomplete reading: {:?}", reading);
            return Ok(None);
        }
        convert(&reading)?.to_vec().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::mpsc::sync_channel;

    fn reading(temperature: Slot<f64>, humidity: Slot<Value>, pressure: Slot<f64>) -> Reading {
        Reading {
            time: Slot::Present(json!("2017-09-01T10:00:00")),
            profile_name: Slot::Present(json!("Fizzy")),
            humidity,
            temperature,
            pressure,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn complete_reading_passes() {
        let r = reading(Slot::Present(0.0), Slot::Present(50.into()), Slot::Present(101.325));
        assert!(is_complete(&r));
    }

    #[test]
    fn null_or_missing_measurement_fails() {
        let full = reading(Slot::Present(0.0), Slot::Present(50.into()), Slot::Present(101.325));
        for missing in [Slot::Null, Slot::Absent] {
            let mut r = full.clone();
            r.temperature = missing.clone();
            assert!(!is_complete(&r));

            let mut r = full.clone();
            r.pressure = missing.clone();
            assert!(!is_complete(&r));

            let mut r = full.clone();
            r.humidity = match missing {
                Slot::Null => Slot::Null,
                _ => Slot::Absent,
            };
            assert!(!is_complete(&r));
        }
    }

    #[test]
    fn converts_freezing_point_and_sea_level() {
        let out = convert(&reading(Slot::Present(0.0), Slot::Present(50.into()), Slot::Present(101.325))).unwrap();
        assert_eq!(out.temperature, Slot::Present(32.0));
        assert_eq!(out.humidity, Slot::Present(json!(50)));
        assert_eq!(out.pressure, Slot::Present(101.325 / KPA_PER_PSI));
        assert!(close(*out.pressure.value().unwrap(), 14.6954));
        assert_eq!(out.time, Slot::Present(json!("2017-09-01T10:00:00")));
        assert_eq!(out.profile_name, Slot::Present(json!("Fizzy")));
    }

    #[test]
    fn converts_boiling_point() {
        let out = convert(&reading(Slot::Present(100.0), Slot::Present(10.into()), Slot::Present(200.0))).unwrap();
        assert_eq!(out.temperature, Slot::Present(212.0));
        assert!(close(*out.pressure.value().unwrap(), 29.0065));
    }

    #[test]
    fn conversion_is_not_idempotent() {
        let once = convert(&reading(Slot::Present(100.0), Slot::Present(10.into()), Slot::Present(200.0))).unwrap();
        let twice = convert(&once).unwrap();
        assert_eq!(twice.temperature, Slot::Present(212.0 * 1.8 + 32.0));
        assert_ne!(twice.temperature, once.temperature);
        assert_ne!(twice.pressure, once.pressure);
    }

    #[test]
    fn converter_omits_measurements_without_value() {
        let out = convert(&reading(Slot::Null, Slot::Null, Slot::Absent)).unwrap();
        assert_eq!(out.temperature, Slot::Absent);
        assert_eq!(out.humidity, Slot::Absent);
        assert_eq!(out.pressure, Slot::Absent);
    }

    #[test]
    fn converter_passes_null_identifiers_through() {
        let mut r = reading(Slot::Present(1.0), Slot::Present(1.into()), Slot::Present(1.0));
        r.time = Slot::Null;
        r.profile_name = Slot::Absent;
        let out = convert(&r).unwrap();
        assert_eq!(out.time, Slot::Null);
        assert_eq!(out.profile_name, Slot::Absent);
    }

    #[test]
    fn processor_drops_reading_with_null_humidity() {
        let input = br#"{"time": 1, "profile_name": "p", "humidity": null, "temperature": 25, "pressure": 100}"#;
        assert!(ReadingProcessor::new().process(input.to_vec()).unwrap().is_none());
    }

    #[test]
    fn processor_drops_reading_without_temperature_key() {
        let input = br#"{"time": 1, "profile_name": "p", "humidity": 40, "pressure": 100}"#;
        assert!(ReadingProcessor::new().process(input.to_vec()).unwrap().is_none());
    }

    #[test]
    fn overflowing_temperature_is_an_error() {
        let r = reading(Slot::Present(1e308), Slot::Present(1.into()), Slot::Present(1.0));
        let err = convert(&r).unwrap_err();
        assert!(matches!(err, ProcessingError::OutOfRange { field: "temperature", .. }));

        let input = br#"{"time": 1, "profile_name": "p", "humidity": 1, "temperature": 1e308, "pressure": 1}"#;
        assert!(ReadingProcessor::new().process(input.to_vec()).is_err());
    }

    #[test]
    fn processor_passes_text_humidity_through() {
        let input = br#"{"time": 1, "profile_name": "p", "humidity": "50%", "temperature": 0, "pressure": 6.895}"#;
        let out = ReadingProcessor::new().process(input.to_vec()).unwrap().unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out,
                   json!({"time": 1, "profile_name": "p", "humidity": "50%", "temperature": 32.0, "pressure": 1.0}));
    }

    #[test]
    fn processor_reports_bad_payload() {
        let input = br#"{"time": 1, "profile_name": "p", "humidity": 40, "temperature": "hot", "pressure": 100}"#;
        assert!(ReadingProcessor::new().process(input.to_vec()).is_err());
    }

    #[test]
    fn relay_keeps_going_after_a_bad_message() {
        let (in_tx, in_rx) = sync_channel(8);
        let (out_tx, out_rx) = sync_channel(8);
        in_tx.send(b"garbage".to_vec()).unwrap();
        in_tx.send(br#"{"time": 1, "profile_name": "p", "temperature": 25}"#.to_vec()).unwrap();
        in_tx.send(br#"{"time": 2, "profile_name": "p", "humidity": 1, "temperature": 0, "pressure": 6.895}"#.to_vec())
            .unwrap();
        drop(in_tx);

        let stats = ReadingProcessor::new().relay(in_rx, out_tx, Duration::from_millis(50));
        assert_eq!(stats,
                   RelayStats {
                       received: 3,
                       forwarded: 1,
                       filtered: 1,
                       failed: 1,
                   });

        let out: serde_json::Value = serde_json::from_slice(&out_rx.recv().unwrap()).unwrap();
        assert_eq!(out,
                   json!({"time": 2, "profile_name": "p", "humidity": 1, "temperature": 32.0, "pressure": 1.0}));
        assert!(out_rx.recv().is_err());
    }

    #[test]
    fn relay_stops_when_output_is_gone() {
        let (in_tx, in_rx) = sync_channel(2);
        let (out_tx, out_rx) = sync_channel(2);
        drop(out_rx);
        in_tx.send(br#"{"time": 1, "profile_name": "p", "humidity": 1, "temperature": 0, "pressure": 1}"#.to_vec())
            .unwrap();

        let stats = ReadingProcessor::new().relay(in_rx, out_tx, Duration::from_millis(50));
        assert_eq!(stats.received, 1);
        assert_eq!(stats.forwarded, 0);
    }

    struct Collect(std::cell::RefCell<Vec<u8>>);

    impl DataSink<u8> for Collect {
        type Error = String;

        fn send(&self, item: u8) -> Result<(), String> {
            if item == 0 {
                return Err("zero".to_owned());
            }
            self.0.borrow_mut().push(item);
            Ok(())
        }
    }

    #[test]
    fn sink_relay_counts_delivered_items() {
        let (tx, rx) = sync_channel(4);
        for i in [1u8, 0, 2] {
            tx.send(i).unwrap();
        }
        drop(tx);
        let sink = Collect(Default::default());
        assert_eq!(sink.relay(rx), 2);
        assert_eq!(*sink.0.borrow(), vec![1, 2]);
    }
}
