use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Install the logger. The crate's own records pass at Debug; [`set_verbose`] picks the visible level.
pub fn setup_logging(verbose: bool) {
    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn) // dependencies (reqwest, rustls): warnings only
        .filter_module(env!("CARGO_PKG_NAME"), LevelFilter::Debug)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME");
            let thread = std::thread::current();
            let thread_name = thread.name().unwrap_or("main");
            let line = match record.level() {
                Level::Error | Level::Warn => {
                    let level_str = match record.level() {
                        Level::Warn => "WARN".yellow(),
                        _ => "ERROR".red(),
                    };
                    let path = record.target().to_string().white();
                    format!(
                        "[{} {} {} {}] {}",
                        name.cyan(),
                        level_str,
                        thread_name.dimmed(),
                        path,
                        record.args()
                    )
                }
                _ => format!("[{} {}] {}", name.cyan(), thread_name.dimmed(), record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .try_init();
    set_verbose(verbose);
}

/// Raise or lower the crate's level after config has been resolved.
pub fn set_verbose(verbose: bool) {
    log::set_max_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
}
