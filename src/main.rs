use std::path;
use std::process;
use std::time;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use line_sort::{generator, LineSorterBuilder};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    match arg_parser.subcommand() {
        Some(("sort", args)) => sort(args),
        Some(("generate", args)) => generate(args),
        _ => unreachable!("subcommand is required"),
    }
}

fn sort(args: &clap::ArgMatches) {
    let input = path::Path::new(args.value_of("input").expect("value is required"));
    let output = path::Path::new(args.value_of("output").expect("value is required"));
    let chunk_size: ByteSize = args.value_of_t_or_exit("chunk_size");
    let merge_fan_in: usize = args.value_of_t_or_exit("fan_in");
    let threads: Option<usize> = args.is_present("threads").then(|| args.value_of_t_or_exit("threads"));
    let tmp_dir: Option<&str> = args.value_of("tmp_dir");

    let mut sorter_builder = LineSorterBuilder::new()
        .with_chunk_size(chunk_size.as_u64() as usize)
        .with_merge_fan_in(merge_fan_in);
    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }
    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let sorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let file_size = match input.metadata() {
        Ok(metadata) => metadata.len(),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    log::info!("sorting {} ({}) into {}", input.display(), ByteSize(file_size), output.display());
    let started = time::Instant::now();

    if let Err(err) = sorter.sort_file(input, output) {
        log::error!("data sorting error: {}", err);
        process::exit(1);
    }

    report(file_size, started.elapsed());
}

fn generate(args: &clap::ArgMatches) {
    let output = path::Path::new(args.value_of("output").expect("value is required"));
    let size: ByteSize = args.value_of_t_or_exit("size");

    log::info!("creating {} of {}", output.display(), size);
    let started = time::Instant::now();

    match generator::create_synthetic_file(output, size.as_u64()) {
        Ok(written) => report(written, started.elapsed()),
        Err(err) => {
            log::error!("file creation error: {}", err);
            process::exit(1);
        }
    }
}

fn report(bytes: u64, elapsed: time::Duration) {
    let minutes = elapsed.as_secs_f64() / 60.0;
    let gigabytes = bytes as f64 / 1_000_000_000.0;
    let throughput = if minutes > 0.0 { gigabytes / minutes } else { 0.0 };

    log::info!(
        "done in {} ms ({}, {:.2} GB/min)",
        elapsed.as_millis(),
        ByteSize(bytes),
        throughput
    );
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn validate_size(value: &str) -> Result<(), String> {
    match value.parse::<ByteSize>() {
        Ok(size) if size.as_u64() > 0 => Ok(()),
        Ok(_) => Err("size must be positive".to_string()),
        Err(err) => Err(format!("size format incorrect: {}", err)),
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("line-sort")
        .about("external sorter for newline-delimited text files")
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .subcommand(
            clap::App::new("sort")
                .about("sort a file")
                .arg(
                    clap::Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("file to be sorted")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("result file")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("chunk_size")
                        .short('c')
                        .long("chunk-size")
                        .help("size of a chunk sorted in memory")
                        .takes_value(true)
                        .default_value("2MiB")
                        .validator(validate_size),
                )
                .arg(
                    clap::Arg::new("fan_in")
                        .short('f')
                        .long("fan-in")
                        .help("maximum number of chunks merged at once")
                        .takes_value(true)
                        .default_value("10")
                        .validator(|v| match v.parse::<usize>() {
                            Ok(fan_in) if fan_in >= 2 => Ok(()),
                            _ => Err("fan-in must be a number not less than 2".to_string()),
                        }),
                )
                .arg(
                    clap::Arg::new("threads")
                        .short('t')
                        .long("threads")
                        .help("number of threads to use for parallel sorting and merging")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("tmp_dir")
                        .short('d')
                        .long("tmp-dir")
                        .help("directory to be used to store temporary data")
                        .takes_value(true),
                ),
        )
        .subcommand(
            clap::App::new("generate")
                .about("create a synthetic file of '<number>. <text>' lines")
                .arg(
                    clap::Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("file to be created")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("size")
                        .short('s')
                        .long("size")
                        .help("minimum file size")
                        .required(true)
                        .takes_value(true)
                        .validator(validate_size),
                ),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
