fn main() {
    loam::env_loader::load_dotenv();
    loam::logging::init();

    if let Err(err) = loam::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
