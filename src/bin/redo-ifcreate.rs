// src/bin/redo-ifcreate.rs

fn main() {
    std::process::exit(redo::cli_main());
}
