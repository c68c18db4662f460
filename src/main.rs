//! Headless simulation driver.
//!
//! Loads an avatar config (or defaults), builds a controller against a stub
//! clip library, then runs a short scripted session at 60 fps: idle, an
//! emotion change, a few seconds of synthetic speech, and back to idle.
//! Frames and events are printed as JSON lines.
//!
//! Usage: `kokoro-avatar [config.json] [seconds]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use kokoro_avatar::{
    AnimationClip, AvatarConfig, AvatarController, ClipLibrary, FrequencySample,
    ModelCapabilities,
};
use tracing_subscriber::EnvFilter;

const FPS: f32 = 60.0;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kokoro_avatar=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config: AvatarConfig = match args.next() {
        Some(path) => AvatarConfig::load_or_default(&PathBuf::from(path)),
        None => AvatarConfig::default(),
    };
    let seconds: f32 = match args.next() {
        Some(s) => s.parse().context("seconds must be a number")?,
        None => 12.0,
    };

    let library = stub_library(&config);
    let mut avatar = AvatarController::new(config, library, &ModelCapabilities::full())
        .context("failed to start avatar")?;

    let frames = (seconds * FPS) as usize;
    let dt = 1.0 / FPS;
    for i in 0..frames {
        let t = i as f32 * dt;
        match i {
            i if i == (FPS * 1.0) as usize => avatar.set_emotion("playful")?,
            i if i == (FPS * 3.0) as usize => avatar.start_talking()?,
            i if i == (FPS * 8.0) as usize => avatar.stop_talking()?,
            _ => {}
        }
        avatar.push_frequency_sample(synthetic_speech(t));

        let frame = avatar.update(dt);
        if i % 6 == 0 {
            println!("{}", serde_json::to_string(frame)?);
        }
        for event in avatar.drain_events() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    avatar.teardown();
    Ok(())
}

/// Every clip the config references, with plausible lengths.
fn stub_library(config: &AvatarConfig) -> ClipLibrary {
    let mut library = ClipLibrary::new();
    for group in &config.animation.groups {
        library.insert(AnimationClip::new(group.base.clone(), 4.0));
        for (i, name) in group.variations.iter().enumerate() {
            library.insert(AnimationClip::new(name.clone(), 1.0 + i as f32 * 0.4));
        }
    }
    library
}

/// A 128-bin spectrum whose loudness and tilt wobble like syllables.
fn synthetic_speech(t: f32) -> FrequencySample {
    let syllable = (t * 9.0).sin().abs();
    let tilt = (t * 2.3).sin() * 0.5 + 0.5;
    let bins: Vec<f32> = (0..128)
        .map(|i| {
            let pos = i as f32 / 127.0;
            let low = (1.0 - pos) * (1.0 - tilt);
            let high = pos * tilt;
            (low + high) * syllable
        })
        .collect();
    FrequencySample::from_normalized(&bins)
}
