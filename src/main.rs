fn main() {
    if let Err(err) = screenmind_lib::run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
