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

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use rumqttc::mqttbytes::matches;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub topics: Topics,
    pub pipeline: PipelineSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect_delay_secs: u64,
    /// Capacity of the request queue and of the channels between the threads.
    pub channel_capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        MqttSettings {
            host: "localhost".to_owned(),
            port: 1883,
            client_id: "sensor-relay".to_owned(),
            username: None,
            password: None,
            keep_alive_secs: 5,
            reconnect_delay_secs: 3,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Topics {
    pub input: Option<String>,
    pub output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub idle_timeout_secs: u64,
}

impl PipelineSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings { idle_timeout_secs: 90 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// A log4rs YAML file. Takes precedence over `level`.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_owned(),
            file: None,
        }
    }
}

/// Relays sensor readings from one MQTT topic to another, converting units on the way.
#[derive(Debug, Parser)]
#[command(name = "sensor-relay", version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Topic to read raw readings from
    #[arg(short, long)]
    pub input: Option<String>,

    /// Topic to publish converted readings to
    #[arg(short, long)]
    pub output: Option<String>,

    /// Log level when no log4rs file is given
    #[arg(long)]
    pub log_level: Option<String>,

    /// log4rs YAML configuration
    #[arg(long)]
    pub log_config: Option<PathBuf>,
}

pub fn read_config<T: Read + Sized>(mut f: T) -> Result<Settings, ConfigError> {
    let mut buffer = String::new();
    f.read_to_string(&mut buffer)?;
    Ok(toml::from_str(&buffer)?)
}

pub fn read_config_file<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    read_config(File::open(path)?)
}

impl Settings {
    ///
    /// Loads the file named on the command line, if any, and lets the flags
    /// override what it says.
    ///
    pub fn from_cli(cli: Cli) -> Result<Settings, ConfigError> {
        let mut settings = match cli.config {
            Some(ref path) => read_config_file(path)?,
            None => Settings::default(),
        };
        settings.apply(cli);
        settings.validate()?;
        Ok(settings)
    }

    fn apply(&mut self, cli: Cli) {
        if cli.input.is_some() {
            self.topics.input = cli.input;
        }
        if cli.output.is_some() {
            self.topics.output = cli.output;
        }
        if let Some(level) = cli.log_level {
            self.logging.level = level;
        }
        if cli.log_config.is_some() {
            self.logging.file = cli.log_config;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let input = self.input_topic()?;
        let output = self.output_topic()?;
        if output.contains(['+', '#']) {
            return Err(ConfigError::WildcardOutput(output.to_owned()));
        }
        if matches(output, input) {
            return Err(ConfigError::FeedbackLoop {
                input: input.to_owned(),
                output: output.to_owned(),
            });
        }
        Ok(())
    }

    pub fn input_topic(&self) -> Result<&str, ConfigError> {
        non_empty(&self.topics.input).ok_or(ConfigError::MissingTopic("input"))
    }

    pub fn output_topic(&self) -> Result<&str, ConfigError> {
        non_empty(&self.topics.output).ok_or(ConfigError::MissingTopic("output"))
    }
}

fn non_empty(topic: &Option<String>) -> Option<&str> {
    topic.as_deref().map(str::trim).filter(|t| !t.is_empty())
}
