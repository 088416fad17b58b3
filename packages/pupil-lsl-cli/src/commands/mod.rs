pub mod discover;
pub mod extract;
pub mod outlets;
pub mod prefs;
pub mod record;
pub mod relay;
pub mod schema;

use pupil_lsl_relay::RelayConfig;
use std::io::BufRead;
use std::path::PathBuf;

/// `--config`, falling back to `$PUPIL_LSL_CONFIG` or the platform default.
pub fn config_path(arg: Option<&str>) -> Result<PathBuf, String> {
    match arg {
        Some(path) => Ok(PathBuf::from(path)),
        None => RelayConfig::default_path().map_err(|e| e.to_string()),
    }
}

pub fn load_config(arg: Option<&str>) -> Result<(PathBuf, RelayConfig), String> {
    let path = config_path(arg)?;
    let config = RelayConfig::load(&path).map_err(|e| e.to_string())?;
    Ok((path, config))
}

/// Line reader over `--input` or stdin.
pub fn open_input(input: Option<&str>) -> Result<Box<dyn BufRead>, String> {
    match input {
        Some(path) => std::fs::File::open(path)
            .map(|f| Box::new(std::io::BufReader::new(f)) as Box<dyn BufRead>)
            .map_err(|e| format!("Failed to open input file '{}': {}", path, e)),
        None => Ok(Box::new(std::io::BufReader::new(std::io::stdin()))),
    }
}

#[cfg(not(feature = "lsl-support"))]
pub fn lsl_unavailable(command: &str) -> i32 {
    eprintln!(
        "Error: `{}` needs LSL support. Rebuild with `cargo build --features lsl-support`.",
        command
    );
    crate::exit_codes::UNSUPPORTED
}
