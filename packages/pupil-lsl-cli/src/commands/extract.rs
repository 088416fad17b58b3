use crate::cli::ExtractArgs;
use crate::exit_codes;
use pupil_lsl_relay::PupilEvent;
use std::io::{BufRead, Write};

pub fn execute(args: ExtractArgs) -> i32 {
    let kind = match crate::cli::parse_kinds(std::slice::from_ref(&args.kind)) {
        Ok(kinds) => kinds[0],
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INVALID_ARGS;
        }
    };
    let reader = match super::open_input(args.input.as_deref()) {
        Ok(reader) => reader,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INVALID_ARGS;
        }
    };

    let schema = kind.schema();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let header = std::iter::once("timestamp".to_string())
        .chain(schema.labels())
        .collect::<Vec<_>>()
        .join(",");
    if let Err(e) = writeln!(out, "{}", header) {
        eprintln!("Error: Failed to write to stdout: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    let mut written = 0usize;
    let mut skipped = 0usize;
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

        let event = match serde_json::from_str::<serde_json::Value>(&line)
            .map_err(|e| e.to_string())
            .and_then(|value| PupilEvent::from_json(&value).map_err(|e| e.to_string()))
        {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Skipping line {}: {}", line_no + 1, e);
                skipped += 1;
                continue;
            }
        };
        if event.key() != kind.event_key() {
            log::debug!("Line {}: {} event not consumed by {}", line_no + 1, event.kind_name(), kind);
            continue;
        }

        match schema.extract(&event) {
            Ok(sample) => {
                let row = std::iter::once(event.timestamp())
                    .chain(sample)
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                if let Err(e) = writeln!(out, "{}", row) {
                    eprintln!("Error: Failed to write to stdout: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
                written += 1;
            }
            Err(e) => {
                log::warn!("Skipping line {}: {}", line_no + 1, e);
                skipped += 1;
            }
        }
    }

    log::info!("{} samples extracted, {} events skipped", written, skipped);
    exit_codes::SUCCESS
}
