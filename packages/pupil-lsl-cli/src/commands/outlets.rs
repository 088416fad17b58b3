use crate::cli::OutletsArgs;
use crate::exit_codes;
use crate::output;
use pupil_lsl_relay::OutletKind;
use serde::Serialize;

#[derive(Serialize)]
struct OutletInfo {
    type_name: &'static str,
    stream_name: &'static str,
    stream_type: &'static str,
    event_key: &'static str,
    channel_count: usize,
}

pub fn execute(args: OutletsArgs) -> i32 {
    let outlets: Vec<OutletInfo> = OutletKind::ALL
        .iter()
        .map(|kind| OutletInfo {
            type_name: kind.type_name(),
            stream_name: kind.stream_name(),
            stream_type: kind.stream_type(),
            event_key: kind.event_key().as_str(),
            channel_count: kind.schema().len(),
        })
        .collect();

    if args.json {
        return output::print_json(&outlets);
    }

    println!("Available outlets:\n");
    println!(
        "  {:<24} {:<34} {:<10} {:<10} {:<8}",
        "Type", "Stream name", "LSL type", "Events", "Channels"
    );
    println!("  {}", "-".repeat(88));
    for o in &outlets {
        println!(
            "  {:<24} {:<34} {:<10} {:<10} {:<8}",
            o.type_name, o.stream_name, o.stream_type, o.event_key, o.channel_count
        );
    }

    exit_codes::SUCCESS
}
