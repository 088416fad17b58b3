use crate::cli::DiscoverArgs;

#[cfg(not(feature = "lsl-support"))]
pub async fn execute(_args: DiscoverArgs) -> i32 {
    super::lsl_unavailable("discover")
}

#[cfg(feature = "lsl-support")]
pub async fn execute(args: DiscoverArgs) -> i32 {
    use crate::exit_codes;
    use crate::output;
    use pupil_lsl_relay::discovery::{
        parse_selection, DiscoveredStreams, DiscoveryWatcher, Selection, RELOAD_COMMAND,
    };
    use pupil_lsl_relay::transport::lsl::LslTransport;
    use pupil_lsl_relay::{ResolveFilter, Transport};
    use std::time::Duration;

    if !(args.timeout.is_finite() && args.timeout >= 0.0) {
        eprintln!("Error: --timeout must be a non-negative number of seconds");
        return exit_codes::INVALID_ARGS;
    }

    let filter = args
        .stream_type
        .clone()
        .map(ResolveFilter::Type)
        .unwrap_or(ResolveFilter::All);
    let resolver = LslTransport::new().resolver(filter);
    let mut watcher = DiscoveryWatcher::spawn(resolver, Duration::from_millis(500), 64);

    if !watcher
        .wait_first_result(Duration::from_secs_f64(args.timeout))
        .await
    {
        eprintln!("No streams found within {} seconds", args.timeout);
    }
    let mut streams = DiscoveredStreams::default();
    watcher.drain_events(&mut streams);

    if !args.interactive {
        watcher.shutdown().await;
        if args.json {
            return output::print_json(&streams.list());
        }
        for descriptor in streams.list() {
            println!(
                "  {:<40} {:<12} {:>4} ch  {:>8} Hz  {}",
                descriptor.label(),
                descriptor.stream_type,
                descriptor.channel_count,
                descriptor.nominal_srate,
                descriptor.source_id
            );
        }
        return exit_codes::SUCCESS;
    }

    let code = loop {
        println!();
        for (index, descriptor) in streams.list().iter().enumerate() {
            println!("  [{}] {} ({})", index, descriptor.label(), descriptor.stream_type);
        }
        println!(
            "Select a stream by index, or {} to reload the list:",
            RELOAD_COMMAND
        );

        let read = tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            std::io::stdin().read_line(&mut input).map(|n| (n, input))
        })
        .await;
        let input = match read {
            Ok(Ok((0, _))) => {
                eprintln!("Error: No selection made");
                break exit_codes::INVALID_ARGS;
            }
            Ok(Ok((_, input))) => input,
            Ok(Err(e)) => {
                eprintln!("Error: Failed to read selection: {}", e);
                break exit_codes::EXECUTION_ERROR;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break exit_codes::EXECUTION_ERROR;
            }
        };

        match parse_selection(&input, streams.len()) {
            Selection::Reload => {
                watcher.drain_events(&mut streams);
            }
            Selection::Index(index) => {
                let Some(descriptor) = streams.get(index) else {
                    continue;
                };
                match descriptor.to_xml() {
                    Ok(xml) => {
                        println!("{}", xml);
                        break exit_codes::SUCCESS;
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        break exit_codes::EXECUTION_ERROR;
                    }
                }
            }
            Selection::Invalid(input) => {
                eprintln!("Invalid selection '{}'", input);
            }
        }
    };

    watcher.shutdown().await;
    code
}
