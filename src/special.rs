//! # Special Targets
//!
//! Files recovered by exact file name instead of content search. The table
//! is ordered: the first target whose name matches wins, and every target
//! names the action applied to the matching file.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::catalog::is_plain_file_name;
use crate::config::{SpecialAction, SpecialTargetConfig};
use crate::constants::MANIFEST_FILE_NAME;

#[derive(Debug, Error)]
pub enum SpecialTargetError {
    #[error("special target {0:?} is not a plain file name")]
    InvalidName(String),
    #[error("special target {0:?} is listed twice")]
    Duplicate(String),
    #[error("special target output {0:?} is reserved for the run manifest")]
    ReservedName(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no database decoder configured")]
    NotConfigured,
    #[error("failed to launch decoder {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("decoder {program} exited with {status}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("decoder did not produce {}", .0.display())]
    MissingOutput(PathBuf),
}

#[derive(Debug, Error)]
pub enum SpecialError {
    #[error("copy failed: {0}")]
    Copy(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Turns the encrypted database file into its text form.
pub trait GameDataDecoder: Send + Sync {
    fn decode(&self, source: &Path, output: &Path) -> Result<(), DecodeError>;
}

/// Runs an external program with the source and output paths appended to
/// its argument list.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: String,
    args: Vec<String>,
}

impl CommandDecoder {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl GameDataDecoder for CommandDecoder {
    fn decode(&self, source: &Path, output: &Path) -> Result<(), DecodeError> {
        debug!("running {} on {}", self.program, source.display());
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(source)
            .arg(output)
            .status()
            .map_err(|source| DecodeError::Launch {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(DecodeError::Failed {
                program: self.program.clone(),
                status,
            });
        }
        if !output.is_file() {
            return Err(DecodeError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}

/// Used when no decoder is configured; the database target stays missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecoder;

impl GameDataDecoder for NoDecoder {
    fn decode(&self, _source: &Path, _output: &Path) -> Result<(), DecodeError> {
        Err(DecodeError::NotConfigured)
    }
}

pub fn build_decoder(argv: &[String]) -> Arc<dyn GameDataDecoder> {
    match argv.split_first() {
        Some((program, args)) => Arc::new(CommandDecoder::new(program.clone(), args.to_vec())),
        None => Arc::new(NoDecoder),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTarget {
    pub name: String,
    pub action: SpecialAction,
    pub output: String,
    pub label: Option<String>,
}

impl SpecialTarget {
    /// Name used in progress and "couldn't extract" lines.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Apply this target's action to `source`, writing into `destination`.
    /// Returns the path written.
    pub fn apply(
        &self,
        source: &Path,
        destination: &Path,
        decoder: &dyn GameDataDecoder,
    ) -> Result<PathBuf, SpecialError> {
        let output = destination.join(&self.output);
        match self.action {
            SpecialAction::Copy => {
                std::fs::copy(source, &output)?;
            }
            SpecialAction::Decode => decoder.decode(source, &output)?,
        }
        Ok(output)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Special(usize),
    Scan,
}

#[derive(Debug, Clone, Default)]
pub struct SpecialTable {
    targets: Vec<SpecialTarget>,
}

impl SpecialTable {
    pub fn new(targets: Vec<SpecialTarget>) -> Result<Self, SpecialTargetError> {
        for (idx, target) in targets.iter().enumerate() {
            for name in [&target.name, &target.output] {
                if !is_plain_file_name(name) {
                    return Err(SpecialTargetError::InvalidName(name.clone()));
                }
            }
            if target.output.eq_ignore_ascii_case(MANIFEST_FILE_NAME) {
                return Err(SpecialTargetError::ReservedName(target.output.clone()));
            }
            if targets[..idx].iter().any(|t| t.name == target.name) {
                return Err(SpecialTargetError::Duplicate(target.name.clone()));
            }
            if targets[..idx]
                .iter()
                .any(|t| t.output.eq_ignore_ascii_case(&target.output))
            {
                return Err(SpecialTargetError::Duplicate(target.output.clone()));
            }
        }
        Ok(Self { targets })
    }

    pub fn from_config(entries: &[SpecialTargetConfig]) -> Result<Self, SpecialTargetError> {
        Self::new(
            entries
                .iter()
                .map(|cfg| SpecialTarget {
                    name: cfg.name.clone(),
                    action: cfg.action,
                    output: cfg.output.clone().unwrap_or_else(|| cfg.name.clone()),
                    label: cfg.label.clone(),
                })
                .collect(),
        )
    }

    /// Exact, case-sensitive name lookup.
    pub fn classify(&self, file_name: &str) -> Route {
        self.targets
            .iter()
            .position(|t| t.name == file_name)
            .map_or(Route::Scan, Route::Special)
    }

    pub fn get(&self, idx: usize) -> &SpecialTarget {
        &self.targets[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpecialTarget> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str, action: SpecialAction, output: &str) -> SpecialTarget {
        SpecialTarget {
            name: name.to_string(),
            action,
            output: output.to_string(),
            label: None,
        }
    }

    fn default_table() -> SpecialTable {
        let cfg = crate::config::load_config(None).expect("config").config;
        SpecialTable::from_config(&cfg.special_targets).expect("table")
    }

    #[test]
    fn classifies_by_exact_name() {
        let table = default_table();
        assert_eq!(table.classify("TIRViews.dll"), Route::Special(0));
        assert_eq!(table.classify("sgl.dat"), Route::Special(1));
        assert_eq!(table.classify("tirviews.dll"), Route::Scan);
        assert_eq!(table.classify("other.dll"), Route::Scan);
        assert_eq!(table.get(1).display_name(), "game data");
        assert_eq!(table.get(0).display_name(), "TIRViews.dll");
        assert_eq!(table.get(1).output, "gamedata.txt");
    }

    #[test]
    fn rejects_bad_tables() {
        let bad_name = SpecialTable::new(vec![target("a/b.dll", SpecialAction::Copy, "b.dll")]);
        assert!(matches!(bad_name, Err(SpecialTargetError::InvalidName(_))));
        let bad_output = SpecialTable::new(vec![target("b.dll", SpecialAction::Copy, "..")]);
        assert!(matches!(bad_output, Err(SpecialTargetError::InvalidName(_))));
        let dup = SpecialTable::new(vec![
            target("b.dll", SpecialAction::Copy, "b.dll"),
            target("b.dll", SpecialAction::Decode, "c.txt"),
        ]);
        assert!(matches!(dup, Err(SpecialTargetError::Duplicate(_))));
        let same_output = SpecialTable::new(vec![
            target("a.dll", SpecialAction::Copy, "out.dll"),
            target("b.dll", SpecialAction::Copy, "OUT.dll"),
        ]);
        assert!(matches!(same_output, Err(SpecialTargetError::Duplicate(_))));
        let reserved = SpecialTable::new(vec![target(
            "sgl.dat",
            SpecialAction::Decode,
            MANIFEST_FILE_NAME,
        )]);
        assert!(matches!(reserved, Err(SpecialTargetError::ReservedName(_))));
    }

    #[test]
    fn copy_action_copies_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("TIRViews.dll");
        std::fs::write(&source, b"MZ library").expect("write");
        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).expect("mkdir");
        let written = target("TIRViews.dll", SpecialAction::Copy, "TIRViews.dll")
            .apply(&source, &dest, &NoDecoder)
            .expect("copy");
        assert_eq!(written, dest.join("TIRViews.dll"));
        assert_eq!(std::fs::read(written).expect("read"), b"MZ library");
    }

    #[test]
    fn decode_without_decoder_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = target("sgl.dat", SpecialAction::Decode, "gamedata.txt").apply(
            &dir.path().join("sgl.dat"),
            dir.path(),
            &NoDecoder,
        );
        assert!(matches!(
            result,
            Err(SpecialError::Decode(DecodeError::NotConfigured))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn command_decoder_runs_program_with_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("sgl.dat");
        std::fs::write(&source, b"encrypted").expect("write");
        let output = dir.path().join("gamedata.txt");
        let decoder = build_decoder(&["cp".to_string()]);
        decoder.decode(&source, &output).expect("decode");
        assert_eq!(std::fs::read(&output).expect("read"), b"encrypted");

        let failing = build_decoder(&["false".to_string()]);
        assert!(matches!(
            failing.decode(&source, &dir.path().join("x.txt")),
            Err(DecodeError::Failed { .. })
        ));
    }
}
