fn main() {
    if let Err(err) = pipeline_diagram::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
