use rcutest_structs::{compact_number, CacheKey, ConstraintCounts, UsageStats, VarType};
use std::collections::BTreeMap;

#[test]
fn test_key_without_params() {
    let key = CacheKey::new("ROSENBR");
    assert_eq!(key.canonical(), "ROSENBR");
    assert_eq!(key.to_string(), "ROSENBR");
}

#[test]
fn test_key_param_order_independence() {
    let mut a = BTreeMap::new();
    a.insert("N".to_string(), 10.0);
    a.insert("M".to_string(), 20.0);
    let mut b = BTreeMap::new();
    b.insert("M".to_string(), 20.0);
    b.insert("N".to_string(), 10.0);

    let key_a = CacheKey::with_params("P", a);
    let key_b = CacheKey::with_params("P", b);
    assert_eq!(key_a.canonical(), key_b.canonical());
    assert_eq!(key_a.canonical(), "P_M20_N10");
}

#[test]
fn test_key_empty_params_same_as_none() {
    let key = CacheKey::with_params("HS25", BTreeMap::new());
    assert_eq!(key.canonical(), "HS25");
    assert_eq!(key.params, None);
}

#[test]
fn test_compact_number() {
    assert_eq!(compact_number(10.0), "10");
    assert_eq!(compact_number(-3.0), "-3");
    assert_eq!(compact_number(0.5), "0.5");
    assert_eq!(compact_number(1e5), "100000");
}

#[test]
fn test_parse_entry_name() {
    let key = CacheKey::parse_entry_name("ARGLALE_N10");
    assert_eq!(key.name, "ARGLALE");
    let params = key.params.unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params["N"], 10.0);

    let key = CacheKey::parse_entry_name("ROSENBR");
    assert_eq!(key.name, "ROSENBR");
    assert_eq!(key.params, None);
}

#[test]
fn test_parse_entry_name_roundtrip() {
    let mut params = BTreeMap::new();
    params.insert("N".to_string(), 10.0);
    params.insert("ALPHA".to_string(), 0.5);
    let key = CacheKey::with_params("PROB", params);
    let parsed = CacheKey::parse_entry_name(&key.canonical());
    assert_eq!(parsed, key);
}

#[test]
fn test_vartype_tags() {
    assert_eq!(VarType::from_tag(0).unwrap(), VarType::Real);
    assert_eq!(VarType::from_tag(1).unwrap(), VarType::Boolean);
    assert_eq!(VarType::from_tag(2).unwrap(), VarType::Integer);
    assert!(VarType::from_tag(3).is_err());
}

#[test]
fn test_stats_delta() {
    let baseline = UsageStats {
        f: 2,
        g: 1,
        h: 0,
        hprod: 0,
        cons: Some(ConstraintCounts { c: 3, cg: 0, ch: 0 }),
        tsetup: 0.1,
        trun: 0.0,
    };
    let current = UsageStats {
        f: 7,
        g: 1,
        h: 2,
        hprod: 4,
        cons: Some(ConstraintCounts { c: 5, cg: 1, ch: 0 }),
        tsetup: 0.1,
        trun: 0.4,
    };
    let delta = current.since(&baseline);
    assert_eq!(delta.f, 5);
    assert_eq!(delta.g, 0);
    assert_eq!(delta.h, 2);
    assert_eq!(delta.hprod, 4);
    assert_eq!(delta.cons, Some(ConstraintCounts { c: 2, cg: 1, ch: 0 }));
    assert_eq!(delta.trun, 0.4);
}

#[test]
fn test_stats_delta_unconstrained() {
    let baseline = UsageStats::default();
    let current = UsageStats {
        f: 3,
        ..UsageStats::default()
    };
    let delta = current.since(&baseline);
    assert_eq!(delta.f, 3);
    assert_eq!(delta.cons, None);
}
