use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const ENV_PREFIXES: [&str; 3] = ["ASPACE_SYNC_", "ARCHIVESSPACE_", "ATOM_"];
const EXTRA_ENV_KEYS: [&str; 1] = ["REPOSITORY_ID"];

fn collect_rs_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, out)?;
        } else if path.extension().and_then(|ext| ext.to_str()) == Some("rs") {
            out.push(path);
        }
    }
    Ok(())
}

fn is_env_char(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte.is_ascii_digit() || byte == b'_'
}

/// Collect every quoted `"PREFIX_NAME"` literal so only keys the code reads
/// end up in the allowlist.
fn collect_env_keys(source: &str, prefix: &str, out: &mut BTreeSet<String>) {
    let needle = format!("\"{prefix}");
    let bytes = source.as_bytes();
    let mut from = 0usize;
    while let Some(found) = source[from..].find(&needle) {
        let start = from + found + 1;
        let mut end = start + prefix.len();
        while end < bytes.len() && is_env_char(bytes[end]) {
            end += 1;
        }
        if end > start + prefix.len() && bytes.get(end) == Some(&b'"') {
            if let Some(raw) = source.get(start..end) {
                out.insert(raw.to_string());
            }
        }
        from = end;
    }
}

fn write_generated_allowlist() -> std::io::Result<()> {
    let mut rs_files = Vec::new();
    collect_rs_files(Path::new("src"), &mut rs_files)?;

    let mut keys = EXTRA_ENV_KEYS
        .iter()
        .map(|k| k.to_string())
        .collect::<BTreeSet<_>>();
    for file in rs_files {
        if let Ok(content) = fs::read_to_string(&file) {
            for prefix in ENV_PREFIXES {
                collect_env_keys(&content, prefix, &mut keys);
            }
        }
    }

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let generated = Path::new(&out_dir).join("env_allowlist.rs");
    let mut f = fs::File::create(generated)?;
    writeln!(f, "pub const GENERATED_ENV_ALLOWLIST: &[&str] = &[")?;
    for key in keys {
        writeln!(f, "    \"{key}\",")?;
    }
    writeln!(f, "];")?;
    Ok(())
}

fn main() {
    write_generated_allowlist().expect("failed to generate env allowlist");

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("clock after epoch");
    let build_id = format!("{:x}-{:x}", now.as_secs(), now.subsec_nanos());

    println!("cargo:rustc-env=BUILD_UUID={}", build_id);
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}
