fn main() {
    if let Err(e) = billcheck::run() {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
