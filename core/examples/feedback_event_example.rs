// Minimal example of a FeedbackEvent handle following one cue through the daemon
use anyhow::Result;
use log::info;
use ngf_core::{ClientConfig, ClientProvider, EventStatus, FeedbackEvent, PropertyValue};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // One shared client for the whole process
    let provider = ClientProvider::with_ipc(ClientConfig::from_env());
    let client = provider.acquire();

    let mut ringtone = FeedbackEvent::with_event(client.clone(), "ringtone");
    let mut properties = ringtone.properties().clone();
    properties.insert("sound.volume".to_string(), PropertyValue::Int(60));
    ringtone.set_properties(properties);

    if !ringtone.play().await {
        anyhow::bail!("ringtone could not be requested");
    }
    info!("Ringtone requested. Press Ctrl+C to stop it.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                ringtone.stop().await;
                break;
            }
            status = ringtone.next_status() => match status {
                Some(EventStatus::Stopped) | Some(EventStatus::Failed) | None => break,
                Some(status) => info!("Ringtone is now {:?}", status),
            }
        }
    }

    info!("Ringtone finished with {:?}", ringtone.status());
    drop(ringtone);
    client.shutdown().await;
    Ok(())
}
