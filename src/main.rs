fn main() {
    if let Err(err) = flow_labeler::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
