use crate::Toolchain;
use rcutest_structs::{Error, Result};
use std::fs;
use std::path::Path;
use std::process::Command;

/// One tunable parameter of a SIF problem, as advertised by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct SifParam {
    pub name: String,
    pub value: f64,
    pub kind: SifParamKind,
    pub is_default: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SifParamKind {
    Integer,
    Real,
    Unknown,
}

/// Ask the decoder which parameters a problem accepts (`sifdecoder -show`).
pub fn available_params(toolchain: &Toolchain, problem: &str) -> Result<Vec<SifParam>> {
    let output = Command::new(&toolchain.sifdecoder)
        .arg("-show")
        .arg(problem)
        .output()
        .map_err(|e| {
            Error::Configuration(format!(
                "failed to spawn {}: {}",
                toolchain.sifdecoder.display(),
                e
            ))
        })?;
    let combined = String::from_utf8_lossy(&output.stdout);

    let mut params = Vec::new();
    for line in combined.lines() {
        if !line.contains('=') {
            continue;
        }
        if let Some(param) = parse_param_line(line) {
            params.push(param);
        }
    }
    Ok(params)
}

fn parse_param_line(line: &str) -> Option<SifParam> {
    let mut fields = line.split_whitespace();
    let assignment = fields.next()?;
    let (name, raw_value) = assignment.split_once('=')?;
    let kind = match fields.next() {
        Some("(IE)") => SifParamKind::Integer,
        Some("(RE)") => SifParamKind::Real,
        _ => SifParamKind::Unknown,
    };
    let value = raw_value.parse::<f64>().ok()?;
    let comment = if line.contains("uncommented") {
        None
    } else {
        line.split_once("comment:")
            .map(|(_, c)| c.trim().to_string())
    };
    Some(SifParam {
        name: name.to_string(),
        value,
        kind,
        is_default: line.contains("default value"),
        comment,
    })
}

/// Properties decoded from a problem's classification string `OCRr-GI-N-M`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemProperties {
    /// Objective type: N, C, L, Q, S or O.
    pub objective: char,
    /// Constraint type: U, X, B, N, L, Q or O.
    pub constraints: char,
    /// First and second derivatives exist and are continuous.
    pub regular: bool,
    /// Highest derivative degree provided analytically.
    pub degree: u32,
    /// Origin: A (academic), M (modelling), R (real-world).
    pub origin: char,
    /// Problem contains explicit internal variables.
    pub internal: bool,
    /// Number of variables; None when user-settable.
    pub n: Option<usize>,
    /// Number of constraints; None when user-settable or unlisted.
    pub m: Option<usize>,
}

/// Read a problem's classification string from its `.SIF` file.
pub fn classification_string(mastsif: &Path, problem: &str) -> Result<String> {
    let path = mastsif.join(format!("{}.SIF", problem));
    let contents = fs::read_to_string(&path).map_err(|_| {
        Error::Configuration(format!(
            "no SIF file for problem {} under {}",
            problem,
            mastsif.display()
        ))
    })?;
    for line in contents.lines() {
        if let Some(code) = match_classification_line(line) {
            return Ok(code.to_string());
        }
    }
    Err(Error::Configuration(format!(
        "no classification line in {}",
        path.display()
    )))
}

// A classification line reads `* classification CODE`, any case.
fn match_classification_line(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('*')?.trim_start();
    let head = rest.get(..14)?;
    if !head.eq_ignore_ascii_case("classification") {
        return None;
    }
    let code = rest[14..].trim();
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

pub fn problem_properties(toolchain: &Toolchain, problem: &str) -> Result<ProblemProperties> {
    let code = classification_string(&toolchain.mastsif, problem)?;
    parse_classification(&code)
        .ok_or_else(|| Error::Configuration(format!("malformed classification string: {}", code)))
}

fn parse_classification(code: &str) -> Option<ProblemProperties> {
    let parts: Vec<&str> = code.split('-').collect();
    if parts.len() < 3 {
        return None;
    }
    let head: Vec<char> = parts[0].chars().collect();
    let tags: Vec<char> = parts[1].chars().collect();
    if head.len() < 4 || tags.len() < 2 {
        return None;
    }
    let n = match parts[2].trim() {
        "V" | "v" => None,
        raw => Some(raw.parse::<usize>().ok()?),
    };
    // some problems omit the constraint count entirely
    let m = match parts.get(3).map(|p| p.trim()) {
        None => None,
        Some("V") | Some("v") => None,
        Some(raw) => raw.parse::<usize>().ok(),
    };
    Some(ProblemProperties {
        objective: head[0].to_ascii_uppercase(),
        constraints: head[1].to_ascii_uppercase(),
        regular: head[2] == 'R' || head[2] == 'r',
        degree: head[3].to_digit(10)?,
        origin: tags[0].to_ascii_uppercase(),
        internal: tags[1] == 'Y' || tags[1] == 'y',
        n,
        m,
    })
}

/// Classification-based search filter. Unset fields match everything;
/// problems with a user-settable count match any requested n/m range.
#[derive(Debug, Clone, Default)]
pub struct ProblemFilter {
    pub objective: Option<String>,
    pub constraints: Option<String>,
    pub regular: Option<bool>,
    pub degree: Option<(u32, u32)>,
    pub origin: Option<String>,
    pub internal: Option<bool>,
    pub n: Option<(usize, usize)>,
    pub user_n: Option<bool>,
    pub m: Option<(usize, usize)>,
    pub user_m: Option<bool>,
}

impl ProblemFilter {
    pub fn matches(&self, props: &ProblemProperties) -> bool {
        if let Some(letters) = &self.objective {
            if !letters.to_ascii_uppercase().contains(props.objective) {
                return false;
            }
        }
        if let Some(letters) = &self.constraints {
            if !letters.to_ascii_uppercase().contains(props.constraints) {
                return false;
            }
        }
        if let Some(regular) = self.regular {
            if props.regular != regular {
                return false;
            }
        }
        if let Some((lo, hi)) = self.degree {
            if props.degree < lo || props.degree > hi {
                return false;
            }
        }
        if let Some(letters) = &self.origin {
            if !letters.to_ascii_uppercase().contains(props.origin) {
                return false;
            }
        }
        if let Some(internal) = self.internal {
            if props.internal != internal {
                return false;
            }
        }
        if let (Some((lo, hi)), Some(n)) = (self.n, props.n) {
            if n < lo || n > hi {
                return false;
            }
        }
        if let Some(user_n) = self.user_n {
            if user_n != props.n.is_none() {
                return false;
            }
        }
        if let (Some((lo, hi)), Some(m)) = (self.m, props.m) {
            if m < lo || m > hi {
                return false;
            }
        }
        if let Some(user_m) = self.user_m {
            if user_m != props.m.is_none() {
                return false;
            }
        }
        true
    }
}

/// Names of every problem in the collection whose classification matches
/// the filter. Problems without a parsable classification are skipped.
pub fn find_problems(toolchain: &Toolchain, filter: &ProblemFilter) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(&toolchain.mastsif)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(|f| f.strip_suffix(".SIF")) else {
            continue;
        };
        let Ok(code) = classification_string(&toolchain.mastsif, name) else {
            continue;
        };
        let Some(props) = parse_classification(&code) else {
            continue;
        };
        if filter.matches(&props) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classification() {
        let props = parse_classification("SUR2-AN-2-0").unwrap();
        assert_eq!(props.objective, 'S');
        assert_eq!(props.constraints, 'U');
        assert!(props.regular);
        assert_eq!(props.degree, 2);
        assert_eq!(props.origin, 'A');
        assert!(!props.internal);
        assert_eq!(props.n, Some(2));
        assert_eq!(props.m, Some(0));
    }

    #[test]
    fn test_parse_classification_variable_dims() {
        let props = parse_classification("OLR2-AY-V-V").unwrap();
        assert_eq!(props.n, None);
        assert_eq!(props.m, None);
        assert!(props.internal);
    }

    #[test]
    fn test_match_classification_line() {
        assert_eq!(
            match_classification_line("*   classification SUR2-AN-2-0"),
            Some("SUR2-AN-2-0")
        );
        assert_eq!(
            match_classification_line(" * CLASSIFICATION OLR2-AY-V-V"),
            Some("OLR2-AY-V-V")
        );
        assert_eq!(match_classification_line("* some comment"), None);
        assert_eq!(match_classification_line("VARIABLES"), None);
    }

    #[test]
    fn test_parse_param_line() {
        let param =
            parse_param_line("N=10 (IE)  comment: number of variables (default value)").unwrap();
        assert_eq!(param.name, "N");
        assert_eq!(param.value, 10.0);
        assert_eq!(param.kind, SifParamKind::Integer);
        assert!(param.is_default);
        assert_eq!(
            param.comment.as_deref(),
            Some("number of variables (default value)")
        );

        let param = parse_param_line("ALPHA=0.5 (RE) uncommented").unwrap();
        assert_eq!(param.kind, SifParamKind::Real);
        assert_eq!(param.comment, None);
        assert!(!param.is_default);
    }

    #[test]
    fn test_filter_matching() {
        let props = parse_classification("QLR2-MN-50-10").unwrap();
        let mut filter = ProblemFilter::default();
        assert!(filter.matches(&props));
        filter.objective = Some("QS".to_string());
        assert!(filter.matches(&props));
        filter.objective = Some("N".to_string());
        assert!(!filter.matches(&props));
        filter.objective = None;
        filter.n = Some((1, 20));
        assert!(!filter.matches(&props));
        filter.n = Some((1, 100));
        filter.user_m = Some(true);
        assert!(!filter.matches(&props));
    }
}
