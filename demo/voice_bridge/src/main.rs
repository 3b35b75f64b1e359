mod config;
mod producer;

use std::sync::Arc;
use std::time::Duration;

use config::VoiceBridgeConfig;
use producer::SimProducer;
use serde_json::json;
use timbre_core::{
    DialogStateObserver, DialogUxState, DialogUxStateObserver, ExecStatus, InputCommand,
    InteractionHandler, NormalizedState, Pipeline, PlayerActivity, PlayerActivityObserver,
    VoiceProducer,
};
use tokio::time::sleep;
use tracing::info;

/// Interaction handler that just narrates what it was asked to do.
struct ConsoleHandler;

impl InteractionHandler for ConsoleHandler {
    fn tap(&self) {
        info!(target = "voice_bridge", "handler: tap-to-talk");
    }
    fn hold_to_talk(&self) {
        info!(target = "voice_bridge", "handler: hold-to-talk");
    }
    fn set_mute(&self, mute: bool) {
        info!(target = "voice_bridge", mute, "handler: mute changed");
    }
}

/// Prints each dialog transition as a JSON line, the shape a UI
/// frontend would consume.
struct JsonPrinter;

impl DialogStateObserver for JsonPrinter {
    fn dialogue_state_change(&self, state: NormalizedState, audio_playing: bool) {
        let line = json!({
            "event": "dialoguestatechange",
            "state": state,
            "audio_playing": audio_playing,
        });
        println!("{}", line);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,timbre_core=info,voice_bridge=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let cfg = VoiceBridgeConfig::load();
    info!(
        target = "voice_bridge",
        callsign = %cfg.pipeline.producer_callsign,
        "Starting Voice Bridge demo: Producer → Ring → Reader"
    );

    let handler = Arc::new(ConsoleHandler);
    let pipeline = Pipeline::new(cfg.pipeline.clone(), handler)?;
    info!(
        target = "voice_bridge",
        binding = ?pipeline.bridge.binding_state(),
        "Bridge created before producer exists"
    );

    // Dialog transitions as JSON lines
    let printer: Arc<dyn DialogStateObserver> = Arc::new(JsonPrinter);
    pipeline.coordinator.register(&printer);

    // Reader draining the shared ring, the way a consumer like a voice
    // SDK would
    let ring = Arc::clone(&pipeline.ring);
    let drain = tokio::spawn(async move {
        let mut reader = match ring.create_reader() {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(target = "voice_bridge", error = %e, "reader setup failed");
                return 0usize;
            }
        };
        let mut buf = vec![0u8; 3200];
        let mut total_words = 0usize;
        loop {
            match reader.read(&mut buf) {
                Ok(0) => sleep(Duration::from_millis(20)).await,
                Ok(words) => total_words += words,
                Err(_) => break,
            }
        }
        total_words
    });

    // Activate the producer late to exercise the rebind path
    sleep(Duration::from_millis(cfg.activation_delay_ms)).await;
    let sim = SimProducer::new(cfg.pipeline.sample_rate_hz, cfg.tone_hz);
    pipeline.host.activate(
        &cfg.pipeline.producer_callsign,
        Arc::clone(&sim) as Arc<dyn VoiceProducer>,
    );
    info!(
        target = "voice_bridge",
        binding = ?pipeline.bridge.binding_state(),
        "Producer activated"
    );

    sim.stream_for(Duration::from_secs(cfg.run_seconds));

    // Meanwhile walk through a dialog round trip
    pipeline
        .coordinator
        .on_dialog_ux_state_changed(DialogUxState::Listening);
    sleep(Duration::from_millis(300)).await;
    pipeline
        .coordinator
        .on_dialog_ux_state_changed(DialogUxState::Thinking);
    pipeline
        .coordinator
        .on_player_activity_changed(PlayerActivity::Playing);
    pipeline
        .coordinator
        .on_dialog_ux_state_changed(DialogUxState::Speaking);
    sleep(Duration::from_millis(300)).await;
    pipeline
        .coordinator
        .on_player_activity_changed(PlayerActivity::Finished);
    pipeline
        .coordinator
        .on_dialog_ux_state_changed(DialogUxState::Idle);

    // And a couple of gated commands
    for cmd in [InputCommand::Tap, InputCommand::Mute(true), InputCommand::Mute(false)] {
        let status = pipeline.gate.exec(cmd);
        info!(target = "voice_bridge", ?cmd, ?status, "command dispatched");
        debug_assert_eq!(status, ExecStatus::Ok);
    }

    sleep(Duration::from_secs(cfg.run_seconds)).await;
    pipeline.shutdown();

    let total_words = drain.await.unwrap_or(0);
    let stats = pipeline.ring.stats();
    println!(
        "{}",
        json!({
            "event": "summary",
            "words_drained": total_words,
            "ring": stats,
        })
    );
    Ok(())
}
