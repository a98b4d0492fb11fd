use std::collections::BTreeSet;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use walkdir::WalkDir;

const PREFIX: &str = "CONSOLIDATOR_";
// Log line tags that share the prefix.
const NOT_VARIABLES: &[&str] = &["CONSOLIDATOR_WARN"];

fn env_keys(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
        .filter(|token| {
            token.len() > PREFIX.len() && token.starts_with(PREFIX) && !token.ends_with('_')
        })
        .filter(|token| !NOT_VARIABLES.contains(token))
}

fn main() {
    let mut keys = BTreeSet::new();
    for entry in WalkDir::new("src").into_iter().filter_map(Result::ok) {
        if entry.path().extension().is_some_and(|ext| ext == "rs")
            && let Ok(content) = fs::read_to_string(entry.path())
        {
            keys.extend(env_keys(&content).map(str::to_string));
        }
    }

    let mut generated = String::from("pub const GENERATED_ENV_ALLOWLIST: &[&str] = &[\n");
    for key in &keys {
        let _ = writeln!(generated, "    {key:?},");
    }
    generated.push_str("];\n");
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    fs::write(
        Path::new(&out_dir).join("consolidator_env_allowlist.rs"),
        generated,
    )
    .expect("failed to write env allowlist");

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock is after UNIX_EPOCH");
    println!(
        "cargo:rustc-env=BUILD_UUID={:x}-{:x}",
        now.as_secs(),
        now.subsec_nanos()
    );
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}
