use chrono::Local;
use log::LevelFilter;
use std::io::Write;

/// Maps repeated `-v` flags to a log level.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// Initialises logging as `time level - message` on stderr; stdout carries
/// only listing and status lines.
/// `RUST_LOG` takes precedence over `verbosity` when set.
pub fn init_logger(verbosity: u8) {
    let _ = env_logger::Builder::new()
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
            writeln!(buf, "{} {} - {}", ts, record.level(), record.args())
        })
        .target(env_logger::Target::Stderr)
        .filter_level(level_for(verbosity))
        .parse_default_env()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(1), LevelFilter::Info);
        assert_eq!(level_for(2), LevelFilter::Debug);
        assert_eq!(level_for(9), LevelFilter::Debug);
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logger(0);
        init_logger(2);
    }
}
