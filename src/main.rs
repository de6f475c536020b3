use lim::driver;

fn main() {
    if let Err(err) = driver::run_compiler() {
        eprintln!("Error: {}", err.message());
        std::process::exit(1);
    }
}
