//! Test-only helpers: a temporary batch root and a scripted converter.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::config::BatchConfig;
use crate::io::converter::{ConvertOutput, ConvertRequest, Converter};

/// Temporary batch root with a helper file in place.
pub struct TestRoot {
    temp: TempDir,
}

impl TestRoot {
    /// File name of the helper written into every test root.
    pub const HELPER: &'static str = "convert.sh";

    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        fs::write(temp.path().join(Self::HELPER), "#!/bin/sh\n").context("write helper")?;
        Ok(Self { temp })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Create a subdirectory holding `<name>.txt` so it passes preflight.
    pub fn add_book(&self, name: &str) -> Result<PathBuf> {
        let dir = self.dir(name);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        fs::write(dir.join(format!("{name}.txt")), format!("{name} text\n"))
            .with_context(|| format!("write input for {name}"))?;
        Ok(dir)
    }

    /// Config pointing at the test helper and producing `*.epub`.
    pub fn config(&self) -> BatchConfig {
        BatchConfig {
            helper: PathBuf::from(Self::HELPER),
            command: vec!["sh".to_string(), Self::HELPER.to_string()],
            output_extension: "epub".to_string(),
            required_extensions: vec!["txt".to_string()],
            timeout_secs: 30,
            ..BatchConfig::default()
        }
    }
}

/// One scripted converter response.
#[derive(Debug, Clone)]
pub struct ScriptedConvert {
    /// Files created in the working directory before returning.
    pub files: Vec<String>,
    pub output: ConvertOutput,
}

impl ScriptedConvert {
    /// A successful run that creates `files`.
    pub fn writes(files: &[&str]) -> Self {
        Self {
            files: files.iter().map(|f| f.to_string()).collect(),
            output: ConvertOutput::succeeded(),
        }
    }
}

/// Converter returning queued responses in order.
///
/// Returns an error once the queue is exhausted.
pub struct ScriptedConverter {
    queue: RefCell<VecDeque<ScriptedConvert>>,
    workdirs: RefCell<Vec<PathBuf>>,
    helper_seen: RefCell<Vec<bool>>,
}

impl ScriptedConverter {
    pub fn new(script: Vec<ScriptedConvert>) -> Self {
        Self {
            queue: RefCell::new(script.into()),
            workdirs: RefCell::new(Vec::new()),
            helper_seen: RefCell::new(Vec::new()),
        }
    }

    /// Working directories of every invocation, in call order.
    pub fn workdirs(&self) -> Vec<PathBuf> {
        self.workdirs.borrow().clone()
    }

    /// Whether the staged helper was present at each invocation.
    pub fn helper_seen(&self) -> Vec<bool> {
        self.helper_seen.borrow().clone()
    }
}

impl Converter for ScriptedConverter {
    fn convert(&self, request: &ConvertRequest) -> Result<ConvertOutput> {
        self.workdirs.borrow_mut().push(request.workdir.clone());
        self.helper_seen
            .borrow_mut()
            .push(request.workdir.join(TestRoot::HELPER).is_file());
        let next = self
            .queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted converter exhausted"))?;
        for file in &next.files {
            fs::write(request.workdir.join(file), format!("{file} contents\n"))
                .with_context(|| format!("write scripted output {file}"))?;
        }
        Ok(next.output)
    }
}
