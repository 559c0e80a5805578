use rcutest_structs::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Locations of the external tools and libraries a build needs. Resolution
/// happens once, up front: a missing component is a configuration error,
/// never a build error.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// The SIF decoder executable.
    pub sifdecoder: PathBuf,
    /// Static evaluation library the objects are linked against.
    pub cutest_lib: PathBuf,
    /// Header directory for the generated interface stub.
    pub cutest_include: PathBuf,
    /// Directory holding the `.SIF` problem collection.
    pub mastsif: PathBuf,
    /// Fortran compiler, also used as the link driver.
    pub fortran_compiler: PathBuf,
    /// C compiler for the interface stub.
    pub c_compiler: PathBuf,
}

impl Toolchain {
    /// Resolve every external location from the environment, with the
    /// Homebrew install locations as macOS fallbacks.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            sifdecoder: sifdecoder_path()?,
            cutest_lib: cutest_lib_path()?,
            cutest_include: cutest_include_path()?,
            mastsif: mastsif_path()?,
            fortran_compiler: PathBuf::from("gfortran"),
            c_compiler: PathBuf::from("cc"),
        })
    }
}

/// Cache root: `RCUTEST_CACHE` if set, the current directory otherwise.
pub fn cache_root() -> Result<PathBuf> {
    match env::var_os("RCUTEST_CACHE") {
        Some(root) => {
            let root = PathBuf::from(root);
            if !root.is_dir() {
                return Err(Error::Configuration(format!(
                    "cache directory {} does not exist",
                    root.display()
                )));
            }
            Ok(root)
        }
        None => Ok(env::current_dir()?),
    }
}

fn sifdecoder_path() -> Result<PathBuf> {
    if let Some(prefix) = env::var_os("SIFDECODE") {
        let path = Path::new(&prefix).join("bin").join("sifdecoder");
        if path.is_file() {
            return Ok(path);
        }
    }
    if cfg!(target_os = "macos") {
        let path = PathBuf::from("/usr/local/opt/sifdecode/bin/sifdecoder");
        if path.is_file() {
            return Ok(path);
        }
    }
    Err(Error::Configuration(
        "could not find sifdecoder - has the SIFDECODE environment variable been set correctly?"
            .to_string(),
    ))
}

fn cutest_lib_path() -> Result<PathBuf> {
    if let (Some(cutest), Some(myarch)) = (env::var_os("CUTEST"), env::var_os("MYARCH")) {
        let path = Path::new(&cutest)
            .join("objects")
            .join(&myarch)
            .join("double")
            .join("libcutest.a");
        if path.is_file() {
            return Ok(path);
        }
    }
    if cfg!(target_os = "macos") {
        let path = PathBuf::from("/usr/local/opt/cutest/lib/libcutest.a");
        if path.is_file() {
            return Ok(path);
        }
    }
    Err(Error::Configuration(
        "could not find libcutest.a - have the CUTEST and MYARCH environment variables been set correctly?"
            .to_string(),
    ))
}

fn cutest_include_path() -> Result<PathBuf> {
    if let Some(cutest) = env::var_os("CUTEST") {
        let path = Path::new(&cutest).join("include");
        if path.is_dir() {
            return Ok(path);
        }
    }
    if cfg!(target_os = "macos") {
        let path = PathBuf::from("/usr/local/opt/cutest/include");
        if path.is_dir() {
            return Ok(path);
        }
    }
    Err(Error::Configuration(
        "could not find the cutest.h include directory - has the CUTEST environment variable been set correctly?"
            .to_string(),
    ))
}

fn mastsif_path() -> Result<PathBuf> {
    if let Some(mastsif) = env::var_os("MASTSIF") {
        let path = PathBuf::from(mastsif);
        if path.is_dir() {
            return Ok(path);
        }
    }
    if cfg!(target_os = "macos") {
        let path = PathBuf::from("/usr/local/opt/mastsif/share/mastsif");
        if path.is_dir() {
            return Ok(path);
        }
    }
    Err(Error::Configuration(
        "could not find the SIF problem collection - has the MASTSIF environment variable been set correctly?"
            .to_string(),
    ))
}
