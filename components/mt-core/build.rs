use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=MOOD_SCOPE_ID");

    // The provisioning scope identifier is mandatory. A build without it is
    // the firmware analog of starting the process without its argument.
    let scope_id = std::env::var("MOOD_SCOPE_ID").expect("MOOD_SCOPE_ID not set");

    let out_dir_path = PathBuf::from(std::env::var_os("OUT_DIR").unwrap());
    let out_file_path = out_dir_path.join("consts.rs");

    std::fs::write(
        out_file_path,
        format!(
            "
            // generated from env vars
            pub const MOOD_SCOPE_ID: &str = \"{scope_id}\";"
        ),
    )
    .unwrap();
}
