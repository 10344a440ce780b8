// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, ValueEnum};
use log::LevelFilter;
use ngf_core::{Properties, PropertyValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

/// Plays a feedback event through the feedback daemon.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Name of the event to play, e.g. "ringtone"
    pub event: String,

    /// Event property as key=value; repeatable
    #[arg(short = 'p', long = "property", value_parser = parse_property)]
    pub properties: Vec<(String, PropertyValue)>,

    /// Daemon endpoint; overrides NGF_IPC_ENDPOINT
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Stop the event after this many seconds
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Set the log level
    #[arg(short, long, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn properties(&self) -> Properties {
        self.properties.iter().cloned().collect()
    }
}

/// Values are read as bool, then integer, then string.
pub fn parse_property(arg: &str) -> Result<(String, PropertyValue), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", arg))?;
    if key.is_empty() {
        return Err(format!("missing property name in '{}'", arg));
    }
    let value = if let Ok(b) = value.parse::<bool>() {
        PropertyValue::Bool(b)
    } else if let Ok(i) = value.parse::<i32>() {
        PropertyValue::Int(i)
    } else {
        PropertyValue::String(value.to_string())
    };
    Ok((key.to_string(), value))
}
