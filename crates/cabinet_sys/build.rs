use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=TOKYOCABINET_LIB_DIR");

    // The stand-in engine provides every symbol
    if env::var_os("CARGO_FEATURE_STAND_IN").is_some() {
        return;
    }

    if let Some(dir) = env::var_os("TOKYOCABINET_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
    }
    println!("cargo:rustc-link-lib=tokyocabinet");
}
