use crate::cli::SchemaArgs;
use crate::exit_codes;
use crate::output;
use pupil_lsl_relay::OutletKind;

pub fn execute(args: SchemaArgs) -> i32 {
    let kind = match crate::cli::parse_kinds(std::slice::from_ref(&args.kind)) {
        Ok(kinds) => kinds[0],
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INVALID_ARGS;
        }
    };
    let channels = kind.schema().channel_metadata();

    if args.json {
        return output::print_json(&channels);
    }

    println!(
        "{} ({}, {} channels):\n",
        kind.stream_name(),
        kind.stream_type(),
        channels.len()
    );
    println!(
        "  {:<4} {:<22} {:<6} {:<26} {:<20} {:<10}",
        "#", "Label", "Eye", "Type", "Unit", "Coords"
    );
    println!("  {}", "-".repeat(92));
    for (index, c) in channels.iter().enumerate() {
        println!(
            "  {:<4} {:<22} {:<6} {:<26} {:<20} {:<10}",
            index,
            c.label,
            c.eye.as_deref().unwrap_or("-"),
            c.kind.as_deref().unwrap_or("-"),
            c.unit.as_deref().unwrap_or("-"),
            c.coordinate_system.as_deref().unwrap_or("-")
        );
    }
    if kind == OutletKind::InvisibleGaze {
        println!("\nTimestamps are shifted from Unix time to the LSL clock.");
    }

    exit_codes::SUCCESS
}
