// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Plays a synthetic A/V source through the full pipeline and logs the
//! timeline until end-of-stream.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tracing_subscriber::EnvFilter;

use medialib::ComponentRegistry;
use medialib::engine::SyntheticSource;
use medialib_player::{Player, PlayerEvent};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let registry = Arc::new(ComponentRegistry::with_builtins());
    let mut player = Player::new(registry);

    // 2 seconds of interleaved A/V: 25 fps video, 50 Hz audio packets.
    player.set_source(Box::new(SyntheticSource::av(2_000_000, 40_000, 20_000)));

    let info = player.prepare()?;
    tracing::info!(
        "source: {} streams, {}us, audio={}, video={}",
        info.streams.len(),
        info.duration_us,
        info.has_audio(),
        info.has_video()
    );

    player.start()?;
    player.play()?;

    let events = player.events();
    loop {
        match events.recv_timeout(Duration::from_secs(10))? {
            PlayerEvent::PlayTime { media_time_us } => {
                tracing::info!("media time {}us", media_time_us);
            }
            PlayerEvent::SeekDone => tracing::info!("seek done"),
            PlayerEvent::PlayEnd => {
                tracing::info!("playback finished");
                break;
            }
            PlayerEvent::Fault(error) => bail!("pipeline fault: {error}"),
        }
    }

    player.stop()?;
    Ok(())
}
