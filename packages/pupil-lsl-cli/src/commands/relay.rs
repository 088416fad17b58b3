use crate::cli::RelayArgs;

#[cfg(not(feature = "lsl-support"))]
pub fn execute(_args: RelayArgs) -> i32 {
    super::lsl_unavailable("relay")
}

#[cfg(feature = "lsl-support")]
pub fn execute(args: RelayArgs) -> i32 {
    use crate::exit_codes;
    use pupil_lsl_relay::transport::lsl::LslTransport;
    use pupil_lsl_relay::{system_host_clock, OutletKind, PupilEvent, Relay};
    use std::io::BufRead;

    let kinds = if args.kind.is_empty() {
        OutletKind::CAPTURE.to_vec()
    } else {
        match crate::cli::parse_kinds(&args.kind) {
            Ok(kinds) => kinds,
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return exit_codes::INVALID_ARGS;
            }
        }
    };
    let reader = match super::open_input(args.input.as_deref()) {
        Ok(reader) => reader,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INVALID_ARGS;
        }
    };
    let (config_path, mut config) = match super::load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let transport = LslTransport::new();
    let mut relay = match Relay::setup(
        &transport,
        &config.previous_outlets,
        &system_host_clock(),
        &kinds,
    ) {
        Ok(relay) => relay,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };
    config.previous_outlets = relay.previous_outlets();
    if let Err(e) = config.save(&config_path) {
        log::warn!("Failed to persist outlet ids: {}", e);
    }

    for (line_no, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Error: Failed to read input: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str::<serde_json::Value>(&line)
            .map_err(|e| e.to_string())
            .and_then(|value| PupilEvent::from_json(&value).map_err(|e| e.to_string()));
        match event {
            Ok(event) => {
                relay.recent_events(std::slice::from_ref(&event));
            }
            Err(e) => log::warn!("Skipping line {}: {}", line_no + 1, e),
        }
    }

    for outlet in relay.outlets() {
        log::info!(
            "{}: {} samples pushed, {} dropped",
            outlet.kind(),
            outlet.pushed(),
            outlet.dropped()
        );
    }
    exit_codes::SUCCESS
}
