//! Example: Play a media URL on an AirPlay video receiver
//!
//! Usage: `cargo run --example play_url -- <host> <url> [start-seconds]`
//!
//! Prints the device's events until it reports `stopped` or Ctrl-C is
//! pressed.

use std::time::Duration;

use airplay_video::{AirPlayClient, PlaybackInfo, PlaybackState, ScrubPosition};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airplay_video=debug".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(host), Some(url)) = (args.next(), args.next()) else {
        eprintln!("usage: play_url <host> <url> [start-seconds]");
        return Ok(());
    };
    let start = args.next().map(|s| s.parse::<f64>()).transpose()?;

    let client = AirPlayClient::new(host);

    client.subscribe(|event| {
        println!(
            "event: state={:?} category={:?}",
            event.state().map(|s| s.to_string()),
            event.category()
        );
    });

    println!("Playing {url}...");
    client.play(&url, start).await?.into_result()?;

    let mut state = client.watch_state();
    let mut ticker = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                client.stop().await?;
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == PlaybackState::STOPPED {
                    println!("Device stopped playback");
                    break;
                }
            }
            _ = ticker.tick() => {
                let reply = client.scrub(None).await?;
                if let Some(params) = reply.body.as_parameters() {
                    let position = ScrubPosition::from_parameters(params);
                    println!(
                        "position {:.1}s of {:.1}s",
                        position.position.unwrap_or_default(),
                        position.duration.unwrap_or_default()
                    );
                }
                let reply = client.playback_info().await?;
                if let Some(info) = reply.document().and_then(PlaybackInfo::from_plist) {
                    println!("rate {:?}, ready {:?}", info.rate, info.ready_to_play);
                }
            }
        }
    }

    client.destroy();
    println!("Done!");
    Ok(())
}
