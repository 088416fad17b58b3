use crate::cli::RecordArgs;

#[cfg(not(feature = "lsl-support"))]
pub async fn execute(_args: RecordArgs) -> i32 {
    super::lsl_unavailable("record")
}

#[cfg(feature = "lsl-support")]
pub async fn execute(args: RecordArgs) -> i32 {
    use crate::exit_codes;
    use crate::output;
    use pupil_lsl_relay::session::StartPolicy;
    use pupil_lsl_relay::transport::lsl::LslTransport;
    use pupil_lsl_relay::{system_host_clock, Notification, RecorderPlugin, Transport};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    if let Some(duration) = args.duration {
        if !(duration.is_finite() && duration > 0.0) {
            eprintln!("Error: --duration must be a positive number of seconds");
            return exit_codes::INVALID_ARGS;
        }
    }
    let (config_path, mut config) = match super::load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let transport: Arc<dyn Transport> = Arc::new(LslTransport::new());
    let mut plugin = if args.audio {
        RecorderPlugin::audio(
            transport,
            config.audio_streams_should_record.clone(),
            &config.recorder,
            system_host_clock(),
        )
    } else {
        RecorderPlugin::csv(
            transport,
            config.streams_should_record.clone(),
            &config.recorder,
            system_host_clock(),
        )
    };
    if args.require_all {
        plugin = plugin.with_policy(StartPolicy::RequireAll);
    }

    // Give the resolver one interval to see what is out there
    plugin.poll_streams();
    tokio::time::sleep(Duration::from_millis(config.recorder.discovery_interval_ms)).await;

    let start = Notification::RecordingStarted {
        rec_path: PathBuf::from(&args.dir),
    };
    if let Err(e) = plugin.on_notify(&start) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    let labels = plugin.recording_labels();
    if labels.is_empty() {
        log::warn!("No streams selected for recording");
    } else {
        eprintln!("Recording {} to {}", labels.join(", "), args.dir);
    }

    let deadline = args
        .duration
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs_f64(secs));
    let stop_at = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop_at);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                log::info!("Interrupted, stopping recording");
                break;
            }
            _ = &mut stop_at => break,
            _ = ticker.tick() => {
                plugin.recent_events();
            }
        }
    }

    let summary = plugin.stop_recording();

    let prefs = plugin.init_config();
    if args.audio {
        config.audio_streams_should_record = prefs;
    } else {
        config.streams_should_record = prefs;
    }
    if let Err(e) = config.save(&config_path) {
        log::warn!("Failed to persist stream preferences: {}", e);
    }

    match summary {
        Some(summary) => output::print_json(&summary),
        None => exit_codes::SUCCESS,
    }
}
