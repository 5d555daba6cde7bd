// src/bin/redo-ifchange.rs

fn main() {
    std::process::exit(redo::cli_main());
}
