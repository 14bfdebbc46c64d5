fn main() {
    if let Err(err) = llamachat::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
