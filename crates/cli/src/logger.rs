use logforth::append;

/// Initializes the process-wide `log` dispatch. Debug-level filtering is
/// selected by either `--debug` or the resolved config's `debug` flag; the
/// caller passes the already-merged value in.
pub fn init(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    logforth::builder()
        .dispatch(|d| d.filter(level).append(append::Stderr::default()))
        .apply();
}
