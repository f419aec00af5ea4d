use std::process;
use std::sync::mpsc::sync_channel;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use sensor_relay::config::{Cli, Settings};
use sensor_relay::datasink::{DataSink, ReadingProcessor, StreamProcessor};
use sensor_relay::error::RelayError;
use sensor_relay::logging;
use sensor_relay::publisher::{drive, MqttPublisher};
use sensor_relay::subscription::{connect, MqttSubscription};

fn run(cli: Cli) -> Result<(), RelayError> {
    let settings = Settings::from_cli(cli)?;
    logging::init(&settings.logging)?;

    let input = settings.input_topic()?.to_owned();
    let output = settings.output_topic()?.to_owned();
    info!("Relaying '{}' to '{}' via {}:{}",
          input,
          output,
          settings.mqtt.host,
          settings.mqtt.port);

    let reconnect_delay = Duration::from_secs(settings.mqtt.reconnect_delay_secs);
    let client_id = &settings.mqtt.client_id;
    let (sub_client, sub_connection) = connect(&settings.mqtt, &format!("{}-sub", client_id));
    let (pub_client, pub_connection) = connect(&settings.mqtt, &format!("{}-pub", client_id));
    let capacity = settings.mqtt.channel_capacity;
    let (raw_tx, raw_rx) = sync_channel::<Vec<u8>>(capacity);
    let (clean_tx, clean_rx) = sync_channel::<Vec<u8>>(capacity);

    let subscription = MqttSubscription::new(input, sub_client, sub_connection, reconnect_delay);
    let publisher = MqttPublisher::new(output, pub_client);

    // Exits once the publisher thread drops its client.
    thread::Builder::new()
        .name("publisher-connection".to_owned())
        .spawn(move || drive(pub_connection, reconnect_delay))?;
    let subscriber = thread::Builder::new()
        .name("subscription".to_owned())
        .spawn(move || subscription.start(raw_tx))?;
    let sender = thread::Builder::new()
        .name("publisher".to_owned())
        .spawn(move || publisher.relay(clean_rx))?;

    let stats = ReadingProcessor::new().relay(raw_rx, clean_tx, settings.pipeline.idle_timeout());
    info!("Relay stopped: {}", stats);

    let published = sender.join().map_err(|_| RelayError::Worker("publisher"))?;
    info!("{} readings published", published);
    let received = subscriber.join().map_err(|_| RelayError::Worker("subscription"))?;
    info!("{} messages received", received);
    Ok(())
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        error!("{}", e);
        eprintln!("sensor-relay: {}", e);
        process::exit(1);
    }
}
