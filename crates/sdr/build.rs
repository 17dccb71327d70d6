fn main() {
    // Features reach build scripts as environment variables.
    if std::env::var("CARGO_FEATURE_SDRPLAY").is_ok() {
        println!("cargo:rustc-link-lib=sdrplay_api");
    }
}
