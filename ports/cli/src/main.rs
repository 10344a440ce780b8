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

mod cli;

use std::time::Duration;

use clap::Parser;
use log::{debug, info};
use ngf_core::{ClientConfig, ClientEvent, ClientProvider, EventState};

use crate::cli::Cli;

async fn sleep_or_forever(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let mut config = ClientConfig::from_env();
    if let Some(endpoint) = cli.endpoint.clone() {
        config = config.with_endpoint(endpoint);
    }
    debug!("Using feedback daemon endpoint {}", config.endpoint);

    let duration = match cli.duration {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => anyhow::bail!("Invalid duration: {}", secs),
        None => None,
    };

    let provider = ClientProvider::with_ipc(config);
    let client = provider.acquire();
    let mut events = client.subscribe();

    let id = client.play(&cli.event, cli.properties()).await?;
    info!("Requested '{}' as event {}", cli.event, id);

    let deadline = sleep_or_forever(duration);
    tokio::pin!(deadline);

    let mut outcome = Ok(());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C signal, stopping...");
                client.stop(id).await;
                break;
            }
            _ = &mut deadline => {
                debug!("Duration elapsed, stopping {}", id);
                client.stop(id).await;
                break;
            }
            event = events.recv() => match event {
                Some(ClientEvent::StateChanged { client_id, state }) if client_id == id => {
                    println!("{}: {}", cli.event, state);
                    if state == EventState::Failed {
                        outcome = Err(anyhow::anyhow!("Event '{}' failed", cli.event));
                    }
                    if state.is_terminal() {
                        break;
                    }
                }
                Some(ClientEvent::ConnectivityChanged(connected)) => {
                    debug!("Feedback daemon {}", if connected { "connected" } else { "disconnected" });
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    client.shutdown().await;
    outcome
}
