use anyhow::{anyhow, Result};
use clap::{arg, ArgAction, Command};
use rcutest_cache::{
    available_params, find_problems, problem_properties, ArtifactCache, BuildPipeline,
    ProblemFilter, Toolchain,
};
use rcutest_structs::{CacheKey, OrderingFlags};
use std::collections::BTreeMap;

fn cli() -> Command {
    Command::new("rcutest-manager")
        .about("Builds and manages cached problem evaluators")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("build")
                .about("Decode, compile and install a problem evaluator")
                .arg(arg!(<PROBLEM> "Problem name").value_parser(clap::value_parser!(String)))
                .arg(
                    arg!(--param [PARAM] "Decoder parameter as NAME=VALUE")
                        .action(ArgAction::Append)
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    arg!(--"sif-option" [OPTION] "Extra option passed to the decoder")
                        .action(ArgAction::Append)
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    arg!(--efirst "Order equality constraints first").action(ArgAction::SetTrue),
                )
                .arg(arg!(--lfirst "Order linear constraints first").action(ArgAction::SetTrue))
                .arg(
                    arg!(--nvfirst "Order nonlinear variables first").action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("list").about("List cached problems"))
        .subcommand(
            Command::new("clear")
                .about("Remove a cached problem")
                .arg(arg!(<PROBLEM> "Problem name").value_parser(clap::value_parser!(String)))
                .arg(
                    arg!(--param [PARAM] "Decoder parameter as NAME=VALUE")
                        .action(ArgAction::Append)
                        .value_parser(clap::value_parser!(String)),
                ),
        )
        .subcommand(
            Command::new("params")
                .about("Show the parameters a problem accepts")
                .arg(arg!(<PROBLEM> "Problem name").value_parser(clap::value_parser!(String))),
        )
        .subcommand(
            Command::new("properties")
                .about("Show a problem's classification properties")
                .arg(arg!(<PROBLEM> "Problem name").value_parser(clap::value_parser!(String))),
        )
        .subcommand(
            Command::new("find")
                .about("Search the problem collection by classification")
                .arg(
                    arg!(--objective [LETTERS] "Objective type letters (NCLQSO)")
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    arg!(--constraints [LETTERS] "Constraint type letters (UXBNLQO)")
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    arg!(--origin [LETTERS] "Origin letters (AMR)")
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(arg!(--regular [BOOL] "Regular problems only").value_parser(clap::value_parser!(bool)))
                .arg(arg!(--internal [BOOL] "Internal variables").value_parser(clap::value_parser!(bool)))
                .arg(arg!(--"degree-min" [D] "Minimum analytic derivative degree").value_parser(clap::value_parser!(u32)))
                .arg(arg!(--"degree-max" [D] "Maximum analytic derivative degree").value_parser(clap::value_parser!(u32)))
                .arg(arg!(--"n-min" [N] "Minimum number of variables").value_parser(clap::value_parser!(usize)))
                .arg(arg!(--"n-max" [N] "Maximum number of variables").value_parser(clap::value_parser!(usize)))
                .arg(arg!(--"m-min" [M] "Minimum number of constraints").value_parser(clap::value_parser!(usize)))
                .arg(arg!(--"m-max" [M] "Maximum number of constraints").value_parser(clap::value_parser!(usize)))
                .arg(arg!(--"user-n" [BOOL] "User-settable variable count").value_parser(clap::value_parser!(bool)))
                .arg(arg!(--"user-m" [BOOL] "User-settable constraint count").value_parser(clap::value_parser!(bool))),
        )
}

fn main() {
    let matches = cli().get_matches();

    if let Err(e) = match matches.subcommand() {
        Some(("build", sub_m)) => build(
            sub_m.get_one::<String>("PROBLEM").unwrap().clone(),
            sub_m
                .get_many::<String>("param")
                .unwrap_or_default()
                .cloned()
                .collect(),
            sub_m
                .get_many::<String>("sif-option")
                .unwrap_or_default()
                .cloned()
                .collect(),
            OrderingFlags {
                efirst: sub_m.get_flag("efirst"),
                lfirst: sub_m.get_flag("lfirst"),
                nvfirst: sub_m.get_flag("nvfirst"),
            },
        ),
        Some(("list", _)) => list(),
        Some(("clear", sub_m)) => clear(
            sub_m.get_one::<String>("PROBLEM").unwrap().clone(),
            sub_m
                .get_many::<String>("param")
                .unwrap_or_default()
                .cloned()
                .collect(),
        ),
        Some(("params", sub_m)) => params(sub_m.get_one::<String>("PROBLEM").unwrap().clone()),
        Some(("properties", sub_m)) => {
            properties(sub_m.get_one::<String>("PROBLEM").unwrap().clone())
        }
        Some(("find", sub_m)) => find(ProblemFilter {
            objective: sub_m.get_one::<String>("objective").cloned(),
            constraints: sub_m.get_one::<String>("constraints").cloned(),
            regular: sub_m.get_one::<bool>("regular").copied(),
            degree: match (
                sub_m.get_one::<u32>("degree-min").copied(),
                sub_m.get_one::<u32>("degree-max").copied(),
            ) {
                (None, None) => None,
                (lo, hi) => Some((lo.unwrap_or(0), hi.unwrap_or(2))),
            },
            origin: sub_m.get_one::<String>("origin").cloned(),
            internal: sub_m.get_one::<bool>("internal").copied(),
            n: range_filter(
                sub_m.get_one::<usize>("n-min").copied(),
                sub_m.get_one::<usize>("n-max").copied(),
            ),
            user_n: sub_m.get_one::<bool>("user-n").copied(),
            m: range_filter(
                sub_m.get_one::<usize>("m-min").copied(),
                sub_m.get_one::<usize>("m-max").copied(),
            ),
            user_m: sub_m.get_one::<bool>("user-m").copied(),
        }),
        _ => Err(anyhow!("Invalid subcommand")),
    } {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn range_filter(min: Option<usize>, max: Option<usize>) -> Option<(usize, usize)> {
    match (min, max) {
        (None, None) => None,
        (lo, hi) => Some((lo.unwrap_or(0), hi.unwrap_or(usize::MAX))),
    }
}

fn parse_params(raw: Vec<String>) -> Result<BTreeMap<String, f64>> {
    let mut params = BTreeMap::new();
    for entry in raw {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("parameter {} is not of the form NAME=VALUE", entry))?;
        let value = value
            .parse::<f64>()
            .map_err(|_| anyhow!("parameter {} has a non-numeric value", entry))?;
        params.insert(name.to_string(), value);
    }
    Ok(params)
}

fn build(
    problem: String,
    raw_params: Vec<String>,
    sif_options: Vec<String>,
    ordering: OrderingFlags,
) -> Result<()> {
    let key = CacheKey::with_params(problem, parse_params(raw_params)?);
    let toolchain = Toolchain::from_env()?;
    let cache = ArtifactCache::from_env()?;
    let pipeline = BuildPipeline::new(&toolchain, &cache);
    let already_cached = cache.exists(&key);
    let dir = pipeline.run(&key, ordering, &sif_options)?;
    if already_cached {
        println!("{} already cached at {}", key, dir.display());
    } else {
        println!("{} installed at {}", key, dir.display());
    }
    Ok(())
}

fn list() -> Result<()> {
    let cache = ArtifactCache::from_env()?;
    for key in cache.list()? {
        match &key.params {
            Some(params) => {
                let rendered = params
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<String>>()
                    .join(", ");
                println!("{} ({})", key.name, rendered);
            }
            None => println!("{}", key.name),
        }
    }
    Ok(())
}

fn clear(problem: String, raw_params: Vec<String>) -> Result<()> {
    let key = CacheKey::with_params(problem, parse_params(raw_params)?);
    let cache = ArtifactCache::from_env()?;
    cache.remove(&key)?;
    println!("removed {}", key);
    Ok(())
}

fn params(problem: String) -> Result<()> {
    let toolchain = Toolchain::from_env()?;
    let params = available_params(&toolchain, &problem)?;
    if params.is_empty() {
        println!("no parameters available for {}", problem);
        return Ok(());
    }
    println!("Parameters available for problem {}:", problem);
    for param in params {
        let kind = match param.kind {
            rcutest_cache::SifParamKind::Integer => "int",
            rcutest_cache::SifParamKind::Real => "real",
            rcutest_cache::SifParamKind::Unknown => "unknown",
        };
        let mut line = format!("{} = {} ({})", param.name, param.value, kind);
        if let Some(comment) = &param.comment {
            line.push_str(&format!(" {}", comment));
        }
        if param.is_default {
            line.push_str(" [default]");
        }
        println!("{}", line);
    }
    Ok(())
}

fn properties(problem: String) -> Result<()> {
    let toolchain = Toolchain::from_env()?;
    let props = problem_properties(&toolchain, &problem)?;
    println!("objective:   {}", props.objective);
    println!("constraints: {}", props.constraints);
    println!("regular:     {}", props.regular);
    println!("degree:      {}", props.degree);
    println!("origin:      {}", props.origin);
    println!("internal:    {}", props.internal);
    match props.n {
        Some(n) => println!("n:           {}", n),
        None => println!("n:           variable"),
    }
    match props.m {
        Some(m) => println!("m:           {}", m),
        None => println!("m:           variable"),
    }
    Ok(())
}

fn find(filter: ProblemFilter) -> Result<()> {
    let toolchain = Toolchain::from_env()?;
    for name in find_problems(&toolchain, &filter)? {
        println!("{}", name);
    }
    Ok(())
}
