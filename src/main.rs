fn main() {
    let args = std::env::args();

    if let Err(err) = magnifyfs::run(args) {
        eprintln!("magnifyfs error: {err:#}");
        std::process::exit(1);
    }
}
