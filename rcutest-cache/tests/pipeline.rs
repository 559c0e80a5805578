#![cfg(unix)]

use rcutest_cache::{ArtifactCache, BuildPipeline, Toolchain};
use rcutest_structs::{BuildStage, CacheKey, Error, OrderingFlags};
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

fn temp_root(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("rcutest-pipeline-{}-{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&root).unwrap();
    root
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn fake_toolchain(dir: &Path, decoder_body: &str) -> Toolchain {
    Toolchain {
        sifdecoder: write_script(dir, "sifdecoder", decoder_body),
        cutest_lib: dir.join("libcutest.a"),
        cutest_include: dir.to_path_buf(),
        mastsif: dir.to_path_buf(),
        fortran_compiler: PathBuf::from("true"),
        c_compiler: PathBuf::from("true"),
    }
}

#[test]
fn test_failed_decode_leaves_no_entry() {
    let root = temp_root("decode-fail");
    let toolchain = fake_toolchain(&root, "echo 'something went wrong'; exit 1");
    let cache = ArtifactCache::new(&root);
    let pipeline = BuildPipeline::new(&toolchain, &cache);
    let key = CacheKey::new("BROKEN");

    let err = pipeline
        .run(&key, OrderingFlags::default(), &[])
        .unwrap_err();
    match err {
        Error::Tool { stage, output } => {
            assert_eq!(stage, BuildStage::Decode);
            assert!(output.contains("something went wrong"));
        }
        other => panic!("expected tool failure, got {:?}", other),
    }
    assert!(!cache.exists(&key));
    assert!(!cache.entry_dir(&key).exists());

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_rejected_parameter_is_a_parameter_error() {
    let root = temp_root("param-reject");
    let toolchain = fake_toolchain(
        &root,
        "echo 'WARNING: N not a valid parameter -- skipping'; exit 0",
    );
    let cache = ArtifactCache::new(&root);
    let pipeline = BuildPipeline::new(&toolchain, &cache);

    let mut params = BTreeMap::new();
    params.insert("N".to_string(), 10.0);
    let key = CacheKey::with_params("SOMEPROB", params);

    let err = pipeline
        .run(&key, OrderingFlags::default(), &[])
        .unwrap_err();
    match err {
        Error::Parameter { diagnostic } => {
            assert_eq!(diagnostic, "N not a valid parameter");
        }
        other => panic!("expected parameter error, got {:?}", other),
    }
    assert!(!cache.exists(&key));

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_decode_without_sources_fails_clean() {
    let root = temp_root("no-sources");
    // decoder succeeds but generates nothing
    let toolchain = fake_toolchain(&root, "exit 0");
    let cache = ArtifactCache::new(&root);
    let pipeline = BuildPipeline::new(&toolchain, &cache);
    let key = CacheKey::new("EMPTY");

    let err = pipeline
        .run(&key, OrderingFlags::default(), &[])
        .unwrap_err();
    match err {
        Error::Tool { stage, .. } => assert_eq!(stage, BuildStage::Decode),
        other => panic!("expected tool failure, got {:?}", other),
    }
    assert!(!cache.exists(&key));

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_decoder_runs_in_entry_directory() {
    let root = temp_root("cwd");
    // record the working directory the decoder sees, then fail the build
    let toolchain = fake_toolchain(&root, "pwd > decoded_from.txt; cp decoded_from.txt ..; exit 1");
    let cache = ArtifactCache::new(&root);
    let pipeline = BuildPipeline::new(&toolchain, &cache);
    let key = CacheKey::new("CWDCHECK");

    let before = std::env::current_dir().unwrap();
    let _ = pipeline.run(&key, OrderingFlags::default(), &[]);

    // the entry itself is cleaned up, but the copy in the holder survives
    let recorded = fs::read_to_string(cache.holder_dir().join("decoded_from.txt")).unwrap();
    assert!(recorded.trim().ends_with("CWDCHECK"));
    // the parent process working directory never moved
    assert_eq!(std::env::current_dir().unwrap(), before);

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_decoder_receives_params_and_options() {
    let root = temp_root("argv");
    let toolchain = fake_toolchain(&root, "echo \"$@\" > ../argv.txt; exit 1");
    let cache = ArtifactCache::new(&root);
    let pipeline = BuildPipeline::new(&toolchain, &cache);

    let mut params = BTreeMap::new();
    params.insert("N".to_string(), 10.0);
    params.insert("M".to_string(), 0.5);
    let key = CacheKey::with_params("ARGPROB", params);
    let options = vec!["-st".to_string()];

    let _ = pipeline.run(&key, OrderingFlags::default(), &options);

    let argv = fs::read_to_string(cache.holder_dir().join("argv.txt")).unwrap();
    assert_eq!(argv.trim(), "-param M=0.5 -param N=10 -st ARGPROB");

    fs::remove_dir_all(&root).unwrap();
}
