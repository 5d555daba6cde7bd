// src/main.rs

fn main() {
    std::process::exit(redo::cli_main());
}
