use crate::cli::{PrefsAction, PrefsArgs, PrefsListArgs, PrefsSetArgs};
use crate::exit_codes;
use crate::output;

pub fn execute(args: PrefsArgs) -> i32 {
    match args.action {
        PrefsAction::List(args) => list(args),
        PrefsAction::Set(args) => set(args),
    }
}

fn list(args: PrefsListArgs) -> i32 {
    let (path, config) = match super::load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::EXECUTION_ERROR;
        }
    };
    let prefs = if args.audio {
        &config.audio_streams_should_record
    } else {
        &config.streams_should_record
    };

    if args.json {
        return output::print_json(prefs);
    }

    println!("Config: {}", path.display());
    if prefs.is_empty() {
        println!("No stream preferences stored. New streams are recorded.");
        return exit_codes::SUCCESS;
    }
    for (label, record) in prefs {
        println!("  [{}] {}", if *record { "x" } else { " " }, label);
    }
    exit_codes::SUCCESS
}

fn set(args: PrefsSetArgs) -> i32 {
    let (path, mut config) = match super::load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::EXECUTION_ERROR;
        }
    };
    let prefs = if args.audio {
        &mut config.audio_streams_should_record
    } else {
        &mut config.streams_should_record
    };
    prefs.insert(args.label.clone(), args.record);

    if let Err(e) = config.save(&path) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    println!(
        "{} will {}be recorded",
        args.label,
        if args.record { "" } else { "not " }
    );
    exit_codes::SUCCESS
}
