use clap::{App, Arg, ArgMatches};
use console::style;
use log::{debug, info};
use std::process;

use query_logger::logging::init_logging;
use query_logger::{Config, QueryEvent, QueryLogger};

fn main() {
    let matches = App::new("Query Logger")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Appends a query event to a rotating JSON Lines log")
        .arg(
            Arg::with_name("user_id")
                .value_name("USER_ID")
                .help("Identifier of the user who sent the query")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("query")
                .value_name("QUERY")
                .help("Query text")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::with_name("specialization")
                .value_name("SPECIALIZATION")
                .help("Specialization that handled the query")
                .required(true)
                .index(3),
        )
        .arg(
            Arg::with_name("response")
                .short("r")
                .long("response")
                .value_name("TEXT")
                .help("Response returned to the user")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("response_time")
                .short("t")
                .long("response-time")
                .value_name("SECONDS")
                .help("Time taken to answer, in seconds")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("feedback")
                .short("f")
                .long("feedback")
                .value_name("TEXT")
                .help("User feedback (default: N/A)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("error")
                .short("e")
                .long("error")
                .value_name("TEXT")
                .help("Error raised while answering")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("CONFIG_FILE")
                .help("Path to TOML config file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("log_dir")
                .long("log-dir")
                .value_name("DIR")
                .help("Directory holding the query log (default: /app/logs)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("max_bytes")
                .long("max-bytes")
                .value_name("BYTES")
                .help("Rotate once the log reaches this size (default: 5000000)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("backup_count")
                .long("backup-count")
                .value_name("COUNT")
                .help("Number of rotated archives to keep (default: 5)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("Do not echo the entry to stdout"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Show debug output on stderr"),
        )
        .get_matches();

    init_logging(if matches.is_present("verbose") {
        "debug"
    } else {
        "warn"
    });

    if let Err(e) = run(&matches) {
        eprintln!("{} {}", style("ERROR:").red().bold(), e);
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(matches)?;
    if matches.is_present("verbose") {
        config.print_info();
    }

    let event = build_event(matches)?;
    debug!("Event: {:?}", event);

    let logger = QueryLogger::init(&config)?;
    logger.log_query(&event)?;
    logger.close()?;

    info!("Logged query for user {}", event.user_id);
    Ok(())
}

fn build_config(matches: &ArgMatches) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match matches.value_of("config") {
        Some(path) => {
            debug!("Reading config from {}", path);
            Config::from_file(path)
                .map_err(|e| format!("Failed to read config '{}': {}", path, e))?
        }
        None => Config::default(),
    };

    // Command-line flags win over the config file
    if let Some(dir) = matches.value_of("log_dir") {
        config.log_dir = dir.into();
    }
    if let Some(bytes) = matches.value_of("max_bytes") {
        config.max_bytes = bytes
            .parse()
            .map_err(|e| format!("Invalid --max-bytes '{}': {}", bytes, e))?;
    }
    if let Some(count) = matches.value_of("backup_count") {
        config.backup_count = count
            .parse()
            .map_err(|e| format!("Invalid --backup-count '{}': {}", count, e))?;
    }
    if matches.is_present("quiet") {
        config.echo_stdout = false;
    }

    Ok(config)
}

fn build_event(matches: &ArgMatches) -> Result<QueryEvent, Box<dyn std::error::Error>> {
    // The three positionals are required, clap has already checked them
    let mut event = QueryEvent::new(
        matches.value_of("user_id").unwrap_or_default(),
        matches.value_of("query").unwrap_or_default(),
        matches.value_of("specialization").unwrap_or_default(),
    );

    if let Some(response) = matches.value_of("response") {
        event = event.response(response);
    }
    if let Some(seconds) = matches.value_of("response_time") {
        let seconds: f64 = seconds
            .parse()
            .map_err(|e| format!("Invalid --response-time '{}': {}", seconds, e))?;
        event = event.response_time(seconds);
    }
    if let Some(feedback) = matches.value_of("feedback") {
        event = event.feedback(feedback);
    }
    if let Some(err) = matches.value_of("error") {
        event = event.error(err);
    }

    Ok(event)
}
