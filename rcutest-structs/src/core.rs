use crate::{Error, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Bound magnitude the evaluation library uses for "unbounded".
pub const NO_BOUND: f64 = 1e20;

/// A variable is fixed when its bounds coincide within this tolerance.
pub const FIXED_VAR_TOL: f64 = 1e-15;

/// Installed evaluator module, relative to a cache entry directory.
pub const MODULE_FILE: &str = "evaluator.so";

/// Problem data file produced by the decoder, consumed at setup time.
pub const DATA_FILE: &str = "OUTSDIF.d";

/// Generated C interface stub source.
pub const STUB_FILE: &str = "itf_stub.c";

/// Metadata record describing an installed cache entry.
pub const META_FILE: &str = "meta.json";

// BTreeMap keys give the sorted parameter ordering the canonical encoding
// requires.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheKey {
    pub name: String,
    pub params: Option<BTreeMap<String, f64>>,
}

impl CacheKey {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            params: None,
        }
    }

    pub fn with_params<S: Into<String>>(name: S, params: BTreeMap<String, f64>) -> Self {
        Self {
            name: name.into(),
            params: if params.is_empty() {
                None
            } else {
                Some(params)
            },
        }
    }

    /// Canonical, filesystem-safe identifier: the problem name, optionally
    /// suffixed with the sorted `key` + compact value segments.
    pub fn canonical(&self) -> String {
        match &self.params {
            None => self.name.clone(),
            Some(params) if params.is_empty() => self.name.clone(),
            Some(params) => {
                let segments = params
                    .iter()
                    .map(|(k, v)| format!("{}{}", k, compact_number(*v)))
                    .collect::<Vec<String>>()
                    .join("_");
                format!("{}_{}", self.name, segments)
            }
        }
    }

    /// Best-effort inverse of `canonical` for cache entry directory names.
    /// Assumes the problem name itself contains no underscore; segments that
    /// do not split into a name plus a numeric suffix are skipped.
    pub fn parse_entry_name(entry: &str) -> Self {
        let mut parts = entry.split('_');
        let name = parts.next().unwrap_or(entry).to_string();
        let mut params = BTreeMap::new();
        for segment in parts {
            if let Some((key, value)) = split_param_segment(segment) {
                params.insert(key, value);
            }
        }
        Self {
            name,
            params: if params.is_empty() {
                None
            } else {
                Some(params)
            },
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Compact numeric rendering for cache key segments: integral values render
/// without a fractional part. Distinct values that render identically
/// collide onto the same cache entry; this is a known limitation.
pub fn compact_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn split_param_segment(segment: &str) -> Option<(String, f64)> {
    for split in 1..segment.len() {
        if !segment.is_char_boundary(split) {
            continue;
        }
        let (key, raw) = segment.split_at(split);
        if let Ok(value) = raw.parse::<f64>() {
            return Some((key.to_string(), value));
        }
    }
    None
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderingFlags {
    /// Equality constraints ordered before inequality constraints.
    pub efirst: bool,
    /// Linear constraints ordered before nonlinear constraints.
    pub lfirst: bool,
    /// Nonlinear variables ordered before linear variables.
    pub nvfirst: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Real,
    Boolean,
    Integer,
}

impl VarType {
    pub fn from_tag(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(VarType::Real),
            1 => Ok(VarType::Boolean),
            2 => Ok(VarType::Integer),
            _ => Err(Error::State(format!("unknown variable type tag {}", tag))),
        }
    }
}

/// Full-dimension description common to all problems, produced once by
/// evaluator setup.
#[derive(Debug, Clone)]
pub struct ProblemData {
    pub name: String,
    pub n_full: usize,
    pub x0: Array1<f64>,
    pub bl: Array1<f64>,
    pub bu: Array1<f64>,
    pub vartype: Vec<VarType>,
    /// Nonzeros in the diagonal plus upper triangle of the sparse Hessian,
    /// counted over all variables including fixed ones.
    pub nnzh: usize,
    pub nvfirst: bool,
    pub sif_params: Option<BTreeMap<String, f64>>,
    pub sif_options: Vec<String>,
}

/// Constraint block of a constrained problem description.
#[derive(Debug, Clone)]
pub struct ConstraintData {
    pub m: usize,
    pub v0: Array1<f64>,
    pub cl: Array1<f64>,
    pub cu: Array1<f64>,
    pub equatn: Vec<bool>,
    pub linear: Vec<bool>,
    /// Nonzeros in the sparse constraint Jacobian, all variables included.
    pub nnzj: usize,
    pub efirst: bool,
    pub lfirst: bool,
}

#[derive(Debug, Clone)]
pub enum ProblemInfo {
    Unconstrained { base: ProblemData },
    Constrained { base: ProblemData, cons: ConstraintData },
}

impl ProblemInfo {
    pub fn base(&self) -> &ProblemData {
        match self {
            ProblemInfo::Unconstrained { base } => base,
            ProblemInfo::Constrained { base, .. } => base,
        }
    }

    pub fn constraints(&self) -> Option<&ConstraintData> {
        match self {
            ProblemInfo::Unconstrained { .. } => None,
            ProblemInfo::Constrained { cons, .. } => Some(cons),
        }
    }

    pub fn is_constrained(&self) -> bool {
        matches!(self, ProblemInfo::Constrained { .. })
    }

    pub fn n_full(&self) -> usize {
        self.base().n_full
    }

    pub fn m(&self) -> usize {
        self.constraints().map_or(0, |c| c.m)
    }
}

/// Cumulative evaluator call counters for the constraint routines.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstraintCounts {
    pub c: u64,
    pub cg: u64,
    pub ch: u64,
}

/// Evaluator usage counters plus setup/run CPU times. Counters are
/// cumulative as reported by the native layer; `since` turns two snapshots
/// into a delta.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageStats {
    pub f: u64,
    pub g: u64,
    pub h: u64,
    pub hprod: u64,
    pub cons: Option<ConstraintCounts>,
    pub tsetup: f64,
    pub trun: f64,
}

impl UsageStats {
    /// Counters of `self` minus `baseline`; CPU times pass through.
    /// Constraint counters stay absent for unconstrained problems.
    pub fn since(&self, baseline: &UsageStats) -> UsageStats {
        UsageStats {
            f: self.f.saturating_sub(baseline.f),
            g: self.g.saturating_sub(baseline.g),
            h: self.h.saturating_sub(baseline.h),
            hprod: self.hprod.saturating_sub(baseline.hprod),
            cons: self.cons.map(|c| {
                let b = baseline.cons.unwrap_or_default();
                ConstraintCounts {
                    c: c.c.saturating_sub(b.c),
                    cg: c.cg.saturating_sub(b.cg),
                    ch: c.ch.saturating_sub(b.ch),
                }
            }),
            tsetup: self.tsetup,
            trun: self.trun,
        }
    }
}

/// Metadata record written next to an installed evaluator module. The
/// ordering flags are fixed here at build time; later imports of the same
/// cache entry use these flags, not the ones they were called with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArtifactMeta {
    pub name: String,
    pub params: Option<BTreeMap<String, f64>>,
    pub sif_options: Vec<String>,
    pub ordering: OrderingFlags,
    pub n_full: usize,
    pub m: usize,
}

impl ArtifactMeta {
    pub fn read(dir: &Path) -> Result<Self> {
        let raw = fs::read_to_string(dir.join(META_FILE))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::State(format!("corrupt metadata record: {}", e)))
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| Error::State(format!("failed to encode metadata record: {}", e)))?;
        fs::write(dir.join(META_FILE), raw)?;
        Ok(())
    }
}
