#[cfg(feature = "mic")]
mod run_demo {
    use std::sync::Arc;

    use timbre_core::audio::mic::{MicProducer, MicProducerConfig};
    use timbre_core::{
        InteractionHandler, Pipeline, PipelineConfig, Result, VoiceProducer,
    };
    use tokio::time::{sleep, Duration, Instant};
    use tracing::info;

    struct LogHandler;

    impl InteractionHandler for LogHandler {
        fn tap(&self) {
            info!("tap-to-talk");
        }
        fn hold_to_talk(&self) {
            info!("hold-to-talk");
        }
        fn set_mute(&self, mute: bool) {
            info!(mute, "mute changed");
        }
    }

    #[tokio::main]
    pub async fn main() -> Result<()> {
        tracing_subscriber::fmt::init();

        let config = PipelineConfig::default();
        let callsign = config.producer_callsign.clone();
        let pipeline = Pipeline::new(config, Arc::new(LogHandler))?;

        // Live microphone producer, activated under the configured
        // callsign so the bridge binds to it.
        let mic = MicProducer::new(MicProducerConfig::default());
        let _handle = mic.start().await?;
        pipeline
            .host
            .activate(&callsign, Arc::clone(&mic) as Arc<dyn VoiceProducer>);
        info!(binding = ?pipeline.bridge.binding_state(), "mic activated");

        // Drain the shared ring for a short period to demonstrate
        let mut reader = pipeline.ring.create_reader()?;
        let mut buf = vec![0u8; 3200];
        let mut total_words = 0usize;
        let until = Instant::now() + Duration::from_secs(5);
        while Instant::now() < until {
            let got = reader.read(&mut buf)?;
            total_words += got;
            if got == 0 {
                sleep(Duration::from_millis(20)).await;
            }
        }

        info!(
            total_words,
            profile = ?pipeline.bridge.current_profile(),
            "mic_capture demo done"
        );
        pipeline.shutdown();
        Ok(())
    }
}

#[cfg(feature = "mic")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    run_demo::main()?;
    Ok(())
}

#[cfg(not(feature = "mic"))]
fn main() {
    eprintln!("Enable feature `mic` to run this example:\n  cargo run -p timbre-core --example mic_capture --features mic");
}
