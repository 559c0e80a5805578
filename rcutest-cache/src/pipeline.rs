use crate::{ArtifactCache, Toolchain, ITF_STUB_SOURCE};
use libloading::Library;
use rcutest_structs::{
    ArtifactMeta, BuildStage, CacheKey, Error, OrderingFlags, Result, DATA_FILE, MODULE_FILE,
    STUB_FILE,
};
use std::ffi::CString;
use std::fs;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Diagnostic marker the decoder emits when it rejects a parameter.
const PARAM_REJECTED_MARKER: &str = "WARNING";

type DimsFn = unsafe extern "C" fn(*const c_char, *mut i32, *mut i32) -> i32;

/// Orchestrates decode, compile, link and install for one cache entry.
/// Every external tool runs with the entry directory as its working
/// directory, passed explicitly to the subprocess; the parent process
/// working directory is never touched.
pub struct BuildPipeline<'a> {
    toolchain: &'a Toolchain,
    cache: &'a ArtifactCache,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(toolchain: &'a Toolchain, cache: &'a ArtifactCache) -> Self {
        Self { toolchain, cache }
    }

    /// Build the entry for `key` unless it already exists. On any failure
    /// the entry directory is removed before the error propagates, so a
    /// failed build never looks cached.
    pub fn run(
        &self,
        key: &CacheKey,
        ordering: OrderingFlags,
        sif_options: &[String],
    ) -> Result<PathBuf> {
        if self.cache.exists(key) {
            return Ok(self.cache.entry_dir(key));
        }
        let dir = self.cache.prepare(key)?;
        match self.build_in(&dir, key, ordering, sif_options) {
            Ok(()) => Ok(dir),
            Err(e) => {
                let _ = self.cache.remove(key);
                Err(e)
            }
        }
    }

    fn build_in(
        &self,
        dir: &Path,
        key: &CacheKey,
        ordering: OrderingFlags,
        sif_options: &[String],
    ) -> Result<()> {
        let sources = self.decode(dir, key, sif_options)?;
        self.compile(dir, &sources)?;
        self.link(dir)?;
        self.install(dir, key, ordering, sif_options)
    }

    /// Run the decoder on the problem, capture its combined output and
    /// collect the generated Fortran sources.
    fn decode(&self, dir: &Path, key: &CacheKey, sif_options: &[String]) -> Result<Vec<PathBuf>> {
        let mut cmd = Command::new(&self.toolchain.sifdecoder);
        cmd.current_dir(dir);
        if let Some(params) = &key.params {
            for (name, value) in params {
                cmd.arg("-param");
                cmd.arg(format!("{}={}", name, rcutest_structs::compact_number(*value)));
            }
        }
        for opt in sif_options {
            cmd.arg(opt);
        }
        cmd.arg(&key.name);

        let output = cmd.output().map_err(|e| {
            Error::Configuration(format!(
                "failed to spawn {}: {}",
                self.toolchain.sifdecoder.display(),
                e
            ))
        })?;
        let combined = combined_output(&output.stdout, &output.stderr);

        if !output.status.success() {
            return Err(Error::Tool {
                stage: BuildStage::Decode,
                output: combined,
            });
        }
        if let Some(diagnostic) = find_param_rejection(&combined) {
            return Err(Error::Parameter { diagnostic });
        }

        let sources = files_with_extension(dir, "f")?;
        if sources.is_empty() {
            return Err(Error::Tool {
                stage: BuildStage::Decode,
                output: format!("decoder produced no Fortran sources\n{}", combined),
            });
        }
        Ok(sources)
    }

    /// Compile every generated source individually; the first failing file
    /// aborts the pipeline.
    fn compile(&self, dir: &Path, sources: &[PathBuf]) -> Result<()> {
        for source in sources {
            let output = Command::new(&self.toolchain.fortran_compiler)
                .current_dir(dir)
                .arg("-fPIC")
                .arg("-c")
                .arg(source)
                .output()
                .map_err(|e| {
                    Error::Configuration(format!(
                        "failed to spawn {}: {}",
                        self.toolchain.fortran_compiler.display(),
                        e
                    ))
                })?;
            if !output.status.success() {
                return Err(Error::Tool {
                    stage: BuildStage::Compile,
                    output: format!(
                        "{} failed for {}\n{}",
                        self.toolchain.fortran_compiler.display(),
                        source.display(),
                        combined_output(&output.stdout, &output.stderr)
                    ),
                });
            }
        }
        Ok(())
    }

    /// Write and compile the generated interface stub, then link every
    /// object file against the evaluation library into the loadable module.
    fn link(&self, dir: &Path) -> Result<()> {
        fs::write(dir.join(STUB_FILE), ITF_STUB_SOURCE)?;
        let output = Command::new(&self.toolchain.c_compiler)
            .current_dir(dir)
            .arg("-fPIC")
            .arg("-c")
            .arg(format!("-I{}", self.toolchain.cutest_include.display()))
            .arg(STUB_FILE)
            .output()
            .map_err(|e| {
                Error::Configuration(format!(
                    "failed to spawn {}: {}",
                    self.toolchain.c_compiler.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            return Err(Error::Tool {
                stage: BuildStage::Link,
                output: format!(
                    "stub compilation failed\n{}",
                    combined_output(&output.stdout, &output.stderr)
                ),
            });
        }

        let objects = files_with_extension(dir, "o")?;
        if objects.is_empty() {
            return Err(Error::Tool {
                stage: BuildStage::Link,
                output: "no object files to link".to_string(),
            });
        }
        let mut cmd = Command::new(&self.toolchain.fortran_compiler);
        cmd.current_dir(dir).arg("-shared").arg("-o").arg(MODULE_FILE);
        for object in objects {
            cmd.arg(object);
        }
        cmd.arg(&self.toolchain.cutest_lib);
        let output = cmd.output().map_err(|e| {
            Error::Configuration(format!(
                "failed to spawn {}: {}",
                self.toolchain.fortran_compiler.display(),
                e
            ))
        })?;
        if !output.status.success() {
            return Err(Error::Tool {
                stage: BuildStage::Link,
                output: combined_output(&output.stdout, &output.stderr),
            });
        }
        Ok(())
    }

    /// Probe the freshly linked module for its dimensions and write the
    /// metadata record that marks the entry as installed.
    fn install(
        &self,
        dir: &Path,
        key: &CacheKey,
        ordering: OrderingFlags,
        sif_options: &[String],
    ) -> Result<()> {
        let (n_full, m) = probe_dims(dir)?;
        let meta = ArtifactMeta {
            name: key.name.clone(),
            params: key.params.clone(),
            sif_options: sif_options.to_vec(),
            ordering,
            n_full,
            m,
        };
        meta.write(dir)
    }
}

fn probe_dims(dir: &Path) -> Result<(usize, usize)> {
    let library = unsafe { Library::new(dir.join(MODULE_FILE)) }
        .map_err(|e| Error::Tool {
            stage: BuildStage::Install,
            output: format!("failed to load linked module: {}", e),
        })?;
    let dims = unsafe { library.get::<DimsFn>(b"itf_dims") }.map_err(|e| Error::Tool {
        stage: BuildStage::Install,
        output: format!("linked module is missing itf_dims: {}", e),
    })?;
    let datafile = CString::new(dir.join(DATA_FILE).to_string_lossy().as_bytes())
        .map_err(|e| Error::State(format!("bad data file path: {}", e)))?;
    let mut n: i32 = 0;
    let mut m: i32 = 0;
    let status = unsafe { dims(datafile.as_ptr(), &mut n, &mut m) };
    if status != 0 {
        return Err(Error::Tool {
            stage: BuildStage::Install,
            output: format!("dimension probe returned status {}", status),
        });
    }
    Ok((n as usize, m as usize))
}

fn combined_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    let err = String::from_utf8_lossy(stderr);
    if !err.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&err);
    }
    combined
}

/// Extract the diagnostic from a parameter-rejection line, stripping the
/// marker prefix and the trailing `-- skipping` note.
fn find_param_rejection(output: &str) -> Option<String> {
    for line in output.lines() {
        if line.contains(PARAM_REJECTED_MARKER) {
            let diagnostic = line
                .replace("WARNING: ", "")
                .replace(" -- skipping", "")
                .trim()
                .to_string();
            return Some(diagnostic);
        }
    }
    None
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map_or(false, |e| e == extension) {
            files.push(PathBuf::from(entry.file_name()));
        }
    }
    files.sort();
    Ok(files)
}
