//! Relays sensor readings between two MQTT topics.
//!
//! Each payload read from the input topic is decoded into a [`dto::Reading`],
//! dropped unless temperature, humidity and pressure are all set, converted to
//! Fahrenheit and psi by [`datasink::convert`] and published to the output
//! topic. Messages are independent of each other; three threads joined by
//! bounded channels do the work:
//!
//! ```text
//! MqttSubscription --raw--> ReadingProcessor --clean--> MqttPublisher
//! ```

pub mod config;
pub mod datasink;
pub mod dto;
pub mod error;
pub mod logging;
pub mod publisher;
pub mod subscription;

pub use datasink::{convert, is_complete, ReadingProcessor, StreamProcessor};
pub use dto::{Reading, Slot};
