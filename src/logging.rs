use log::LevelFilter;

/// Install the stderr logger. stdout stays reserved for command reports.
pub fn init(verbose: bool, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().filter_or("CONSOLIDATOR_LOG", "info"));
    if quiet {
        builder.filter_level(LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format_timestamp_secs();
    builder.target(env_logger::Target::Stderr);
    let _ = builder.try_init();
}
