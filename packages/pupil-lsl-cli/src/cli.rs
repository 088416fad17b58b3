use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pupil-lsl",
    version,
    about = "Relay Pupil eye tracking data to LSL and record LSL streams",
    long_about = "Relay gaze, fixation and pupillometry events to Lab Streaming Layer outlets\n\
                  and record LSL streams to CSV or audio files.\n\
                  Commands touching the network need a build with `--features lsl-support`."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the outlets the relay can announce
    Outlets(OutletsArgs),
    /// Show the channel layout of one outlet
    Schema(SchemaArgs),
    /// Convert JSON-lines host events to CSV samples of one outlet
    Extract(ExtractArgs),
    /// Show or change which streams get recorded
    Prefs(PrefsArgs),
    /// Record LSL streams to a session directory
    Record(RecordArgs),
    /// List LSL streams on the network
    Discover(DiscoverArgs),
    /// Relay JSON-lines host events to LSL outlets
    Relay(RelayArgs),
}

#[derive(Args)]
pub struct OutletsArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct SchemaArgs {
    /// Outlet type name (e.g. SceneCameraGaze)
    pub kind: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ExtractArgs {
    /// Outlet type name whose channels are extracted
    #[arg(long)]
    pub kind: String,

    /// JSON-lines event file (default: stdin)
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Args)]
pub struct PrefsArgs {
    #[command(subcommand)]
    pub action: PrefsAction,
}

#[derive(Subcommand)]
pub enum PrefsAction {
    /// Print the stored preferences
    List(PrefsListArgs),
    /// Enable or disable recording of one stream label
    Set(PrefsSetArgs),
}

#[derive(Args)]
pub struct PrefsListArgs {
    /// Config file path
    #[arg(long, env = "PUPIL_LSL_CONFIG")]
    pub config: Option<String>,

    /// Use the audio recorder preferences
    #[arg(long, default_value_t = false)]
    pub audio: bool,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct PrefsSetArgs {
    /// Stream label, "<name> (<hostname>)"
    pub label: String,

    /// true or false
    #[arg(action = clap::ArgAction::Set)]
    pub record: bool,

    /// Config file path
    #[arg(long, env = "PUPIL_LSL_CONFIG")]
    pub config: Option<String>,

    /// Use the audio recorder preferences
    #[arg(long, default_value_t = false)]
    pub audio: bool,
}

#[derive(Args)]
pub struct RecordArgs {
    /// Session directory
    #[arg(long)]
    pub dir: String,

    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long)]
    pub duration: Option<f64>,

    /// Record the first audio stream instead of CSV
    #[arg(long, default_value_t = false)]
    pub audio: bool,

    /// Abort if any selected stream cannot be opened
    #[arg(long, default_value_t = false)]
    pub require_all: bool,

    /// Milliseconds between recorder ticks
    #[arg(long, default_value_t = 50)]
    pub tick_ms: u64,

    /// Config file path
    #[arg(long, env = "PUPIL_LSL_CONFIG")]
    pub config: Option<String>,
}

#[derive(Args)]
pub struct DiscoverArgs {
    /// Seconds to wait for the first stream
    #[arg(long, default_value_t = 5.0)]
    pub timeout: f64,

    /// Prompt for a stream and print its description
    #[arg(long, default_value_t = false)]
    pub interactive: bool,

    /// Only list streams of this type
    #[arg(long = "type")]
    pub stream_type: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct RelayArgs {
    /// Outlet type names to announce (default: the Pupil Capture outlets)
    #[arg(long, num_args = 1..)]
    pub kind: Vec<String>,

    /// JSON-lines event file (default: stdin)
    #[arg(long)]
    pub input: Option<String>,

    /// Config file path
    #[arg(long, env = "PUPIL_LSL_CONFIG")]
    pub config: Option<String>,
}

/// Parse outlet type names, rejecting unknown ones.
pub fn parse_kinds(
    names: &[String],
) -> Result<Vec<pupil_lsl_relay::OutletKind>, String> {
    names
        .iter()
        .map(|name| {
            pupil_lsl_relay::OutletKind::from_type_name(name).map_err(|e| {
                format!(
                    "{}. Known outlets: {}",
                    e,
                    pupil_lsl_relay::OutletKind::ALL
                        .iter()
                        .map(|k| k.type_name())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pupil_lsl_relay::OutletKind;

    #[test]
    fn test_parse_kinds_valid() {
        let kinds = parse_kinds(&["InvisibleGaze".to_string()]).unwrap();
        assert_eq!(kinds, vec![OutletKind::InvisibleGaze]);
        assert!(parse_kinds(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_kinds_invalid() {
        let err = parse_kinds(&["Surfaces".to_string()]).unwrap_err();
        assert!(err.contains("SceneCameraGaze"));
    }

    #[test]
    fn test_prefs_set_parses_bool() {
        let cli = Cli::try_parse_from(["pupil-lsl", "prefs", "set", "eeg (lab)", "false"]).unwrap();
        match cli.command {
            Command::Prefs(PrefsArgs {
                action: PrefsAction::Set(args),
            }) => {
                assert_eq!(args.label, "eeg (lab)");
                assert!(!args.record);
            }
            _ => panic!("expected prefs set"),
        }
    }
}
