//! Regenerates `include/guardheap.h` from the exported C ABI.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR unset"));
    let config = cbindgen::Config::from_file(crate_dir.join("cbindgen.toml"))
        .expect("unreadable cbindgen.toml");

    let include = crate_dir.join("include");
    std::fs::create_dir_all(&include).expect("cannot create include/");

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(include.join("guardheap.h"));
        }
        // A half-edited source tree should not break `cargo build`; keep the
        // last good header.
        Err(e) => println!("cargo:warning=guardheap.h not regenerated: {e}"),
    }
}
