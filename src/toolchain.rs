//! Toolchain configuration for compilation and execution

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ArenaError, ArenaResult};

/// Name of the toolchain entry used for every submission.
pub const DEFAULT_TOOLCHAIN: &str = "cpp";

const EMBEDDED_TOOLCHAIN: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/toolchain.toml"));

/// How to turn one source file into a runnable binary
#[derive(Debug, Clone, PartialEq)]
pub struct Toolchain {
    /// Name of the source file inside the box (e.g., "main.cpp")
    pub source_file: String,
    /// Name of the binary the compile command produces
    pub binary: String,
    /// Compile command, run with the box as working directory
    pub compile_command: Vec<String>,
    /// Run command, run with only the binary copied into the box
    pub run_command: Vec<String>,
}

/// Raw TOML configuration for a toolchain
#[derive(Debug, Deserialize)]
struct RawToolchain {
    source_file: String,
    binary: String,
    compile_command: String,
    run_command: String,
}

impl Toolchain {
    /// Load from a TOML file, or the embedded default when `path` is None.
    pub fn load(path: Option<&Path>) -> ArenaResult<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    ArenaError::Config(format!("cannot read toolchain file {:?}: {}", path, e))
                })?;
                Self::from_toml(&content)
            }
            None => Self::from_toml(EMBEDDED_TOOLCHAIN),
        }
    }

    pub fn from_toml(content: &str) -> ArenaResult<Self> {
        let raw: HashMap<String, RawToolchain> = toml::from_str(content)
            .map_err(|e| ArenaError::Config(format!("invalid toolchain file: {}", e)))?;

        let raw = raw.into_iter().find_map(|(name, raw)| {
            (name.eq_ignore_ascii_case(DEFAULT_TOOLCHAIN)).then_some(raw)
        });
        let raw = raw.ok_or_else(|| {
            ArenaError::Config(format!("toolchain file has no [{}] entry", DEFAULT_TOOLCHAIN))
        })?;

        let compile_command = into_command(&raw.compile_command);
        let run_command = into_command(&raw.run_command);
        if compile_command.is_empty() || run_command.is_empty() {
            return Err(ArenaError::Config(
                "compile_command and run_command must not be empty".to_string(),
            ));
        }

        Ok(Self {
            source_file: raw.source_file,
            binary: raw.binary,
            compile_command,
            run_command,
        })
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_embedded_toolchain() {
        let toolchain = Toolchain::load(None).unwrap();
        assert_eq!(toolchain.source_file, "main.cpp");
        assert_eq!(toolchain.binary, "main");
        assert_eq!(toolchain.run_command, vec!["./main"]);
        assert!(toolchain.compile_command[0].ends_with("g++"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[CPP]
source_file = "sol.cc"
binary = "sol"
compile_command = "clang++ -O2 -o sol sol.cc"
run_command = "./sol"
"#
        )
        .unwrap();

        let toolchain = Toolchain::load(Some(file.path())).unwrap();
        assert_eq!(toolchain.source_file, "sol.cc");
        assert_eq!(
            toolchain.compile_command,
            vec!["clang++", "-O2", "-o", "sol", "sol.cc"]
        );
    }

    #[test]
    fn test_missing_entry_is_config_error() {
        let err = Toolchain::from_toml(
            r#"
[python]
source_file = "main.py"
binary = "main.py"
compile_command = "true"
run_command = "python3 main.py"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ArenaError::Config(_)));
    }
}
