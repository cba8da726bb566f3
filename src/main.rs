fn main() {
    if let Err(err) = vzanalyze::cli::run() {
        vzanalyze::ui::eprintln_error(&err);
        std::process::exit(vzanalyze::exit::exit_code(&err));
    }
}
