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

use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::mqttbytes::matches;
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};

use crate::config::MqttSettings;

///
/// Opens a broker connection under `client_id`. The subscription and the
/// publisher each get their own, so a stalled reader never holds up
/// publishing. Nothing goes over the wire until the returned `Connection` is
/// polled.
///
pub fn connect(settings: &MqttSettings, client_id: &str) -> (Client, Connection) {
    let mut options = MqttOptions::new(client_id, settings.host.clone(), settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
    if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
        options.set_credentials(user.clone(), password.clone());
    }
    Client::new(options, settings.channel_capacity)
}

pub struct MqttSubscription {
    topic: String,
    client: Client,
    connection: Connection,
    reconnect_delay: Duration,
}

impl MqttSubscription {
    pub fn new<T>(topic: T, client: Client, connection: Connection, reconnect_delay: Duration) -> MqttSubscription
        where T: Into<String>
    {
        MqttSubscription {
            topic: topic.into(),
            client: client,
            connection: connection,
            reconnect_delay: reconnect_delay,
        }
    }

    ///
    /// Drives the connection and hands every payload published on the topic
    /// to `sender`. Subscribes again after each (re)connect. Returns the
    /// number of forwarded payloads once the receiving side is gone.
    ///
    pub fn start(mut self, sender: SyncSender<Vec<u8>>) -> u64 {
        let mut forwarded = 0;
        for notification in self.connection.iter() {
            match notification {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected, subscribing to '{}'", self.topic);
                    if let Err(e) = self.client.try_subscribe(self.topic.clone(), QoS::AtLeastOnce) {
                        warn!("Could not subscribe to '{}': {}", self.topic, e);
                    }
                }
                Ok(event) => {
                    if let Some(payload) = payload_for(event, &self.topic) {
                        if sender.send(payload).is_err() {
                            info!("Processing stopped, leaving '{}'", self.topic);
                            break;
                        }
                        forwarded += 1;
                    }
                }
                Err(e) => {
                    warn!("Connection error: {}. Retrying in {:?}", e, self.reconnect_delay);
                    thread::sleep(self.reconnect_delay);
                }
            }
        }
        let _ = self.client.try_disconnect();
        forwarded
    }
}

/// The payload of an incoming publish whose topic matches `filter`.
pub fn payload_for(event: Event, filter: &str) -> Option<Vec<u8>> {
    match event {
        Event::Incoming(Packet::Publish(publish)) => {
            if matches(&publish.topic, filter) {
                Some(publish.payload.to_vec())
            } else {
                debug!("Ignoring message on '{}'", publish.topic);
                None
            }
        }
        _ => None,
    }
}
