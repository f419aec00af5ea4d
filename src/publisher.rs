// Copyright 2016 Claus Matzinger
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{Client, ClientError, Connection, Event, Packet, QoS};

use crate::datasink::DataSink;

/// Publishes converted readings to the output topic.
pub struct MqttPublisher {
    topic: String,
    client: Client,
}

impl MqttPublisher {
    ///
    /// Create a new data sink to relay data towards a topic. `send` blocks
    /// once the client's request queue is full, so the client's connection
    /// has to be polled by `drive` on a thread of its own.
    ///
    pub fn new<T: Into<String>>(topic: T, client: Client) -> MqttPublisher {
        MqttPublisher {
            topic: topic.into(),
            client: client,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl DataSink<Vec<u8>> for MqttPublisher {
    type Error = ClientError;

    fn send(&self, payload: Vec<u8>) -> Result<(), ClientError> {
        self.client.publish(self.topic.clone(), QoS::AtLeastOnce, false, payload)
    }
}

///
/// Polls the publisher's connection, which moves queued publishes onto the
/// wire. Returns the number of acknowledged publishes once every `Client`
/// of the connection is dropped.
///
pub fn drive(mut connection: Connection, reconnect_delay: Duration) -> u64 {
    let mut acknowledged = 0;
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Publisher connected"),
            Ok(Event::Incoming(Packet::PubAck(_))) => acknowledged += 1,
            Ok(event) => debug!("{:?}", event),
            Err(e) => {
                warn!("Publisher connection error: {}. Retrying in {:?}", e, reconnect_delay);
                thread::sleep(reconnect_delay);
            }
        }
    }
    acknowledged
}
