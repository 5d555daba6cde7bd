// src/bin/redo-hash.rs

fn main() {
    std::process::exit(redo::cli_main());
}
