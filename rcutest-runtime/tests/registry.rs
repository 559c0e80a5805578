use rcutest_runtime::{release, ImportOptions};
use rcutest_structs::{CacheKey, Error};

// Importing a real problem needs the external toolchain; the registry's
// bookkeeping around missing entries is testable without it.

#[test]
fn test_release_without_instance_is_a_state_error() {
    let key = CacheKey::new("NEVERLOADED");
    match release(&key).unwrap_err() {
        Error::State(msg) => assert!(msg.contains("NEVERLOADED")),
        other => panic!("expected state error, got {:?}", other),
    }
}

#[test]
fn test_default_options_drop_fixed_variables() {
    let options = ImportOptions::default();
    assert!(options.drop_fixed_variables);
    assert!(!options.ordering.efirst);
    assert!(!options.ordering.lfirst);
    assert!(!options.ordering.nvfirst);
    assert!(options.sif_options.is_empty());
}
