use crate::{EvaluatorBinding, IndexProjection, ProblemInstance};
use once_cell::sync::OnceCell;
use rcutest_cache::{ArtifactCache, BuildPipeline, Toolchain};
use rcutest_structs::{ArtifactMeta, CacheKey, Error, OrderingFlags, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

static INSTANCES: OnceCell<Mutex<HashMap<String, Arc<ProblemInstance>>>> = OnceCell::new();

fn instances() -> Result<MutexGuard<'static, HashMap<String, Arc<ProblemInstance>>>> {
    INSTANCES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .map_err(|_| Error::State("instance registry lock poisoned".to_string()))
}

/// Options for first-time construction of a problem instance. On a registry
/// hit they are ignored entirely: the projection policy and ordering flags
/// are fixed when the instance (and its cache entry) are first created.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub ordering: OrderingFlags,
    pub sif_options: Vec<String>,
    /// Present the reduced free-variable view (default). When false, fixed
    /// variables stay visible and the projection is the identity.
    pub drop_fixed_variables: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            ordering: OrderingFlags::default(),
            sif_options: Vec::new(),
            drop_fixed_variables: true,
        }
    }
}

/// Build (if needed), load, set up and register the problem for `key`, or
/// return the live instance unchanged. The registry lock is held for the
/// whole construction, so one configuration is never set up twice in a
/// process.
pub fn import_problem(key: &CacheKey, options: &ImportOptions) -> Result<Arc<ProblemInstance>> {
    let canonical = key.canonical();
    let mut map = instances()?;
    if let Some(instance) = map.get(&canonical) {
        return Ok(Arc::clone(instance));
    }

    let toolchain = Toolchain::from_env()?;
    let cache = ArtifactCache::from_env()?;
    let pipeline = BuildPipeline::new(&toolchain, &cache);
    let dir = pipeline.run(key, options.ordering, &options.sif_options)?;

    let meta = ArtifactMeta::read(&dir)?;
    let binding = EvaluatorBinding::load(&dir)?;
    let info = binding.setup(meta.ordering, meta.params.clone(), meta.sif_options.clone())?;
    let projection = if options.drop_fixed_variables {
        IndexProjection::from_bounds(&info.base().bl, &info.base().bu)?
    } else {
        IndexProjection::identity(info.n_full())
    };
    let baseline = binding.report()?;

    let instance = Arc::new(ProblemInstance::new(
        key.clone(),
        binding,
        info,
        projection,
        baseline,
    )?);
    map.insert(canonical, Arc::clone(&instance));
    Ok(instance)
}

/// Tear down the native state for `key` and drop the registry entry. Any
/// later evaluation through a retained instance fails with a state error.
pub fn release(key: &CacheKey) -> Result<()> {
    let mut map = instances()?;
    match map.remove(&key.canonical()) {
        Some(instance) => instance.terminate(),
        None => Err(Error::State(format!(
            "no live instance for {}",
            key.canonical()
        ))),
    }
}

/// Canonical keys of the instances currently live in this process.
pub fn live_problems() -> Result<Vec<String>> {
    let map = instances()?;
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    Ok(keys)
}
