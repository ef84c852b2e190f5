//! Route path patterns: normalization, classification and matching.

use std::sync::LazyLock;

use regex::Regex;

use crate::context::Parameters;
use crate::error::{JoltError, JoltResult};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

/// Normalizes a path: collapses repeated slashes, guarantees a leading slash
/// and strips a trailing slash (except on the root).
///
/// ```
/// use jolt::router::normalize_path;
///
/// assert_eq!(normalize_path("//a//b/"), "/a/b");
/// assert_eq!(normalize_path("/a/b"), "/a/b");
/// assert_eq!(normalize_path(""), "/");
/// assert_eq!(normalize_path("users"), "/users");
/// ```
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// The three tiers a route pattern can fall into, in match precedence order.
#[derive(Debug, Clone)]
pub(crate) enum Pattern {
    /// No placeholders and no trailing wildcard; compared byte for byte.
    Exact,
    /// At least one `{name}` placeholder.
    Parameterized { regex: Regex, names: Vec<String> },
    /// Ends in `/*`; matches the prefix itself and anything below it.
    Wildcard { prefix: String },
}

impl Pattern {
    /// Classifies an already-normalized path.
    ///
    /// A trailing `/*` takes priority: the prefix before it is matched
    /// literally even if it contains braces.
    pub(crate) fn compile(path: &str) -> JoltResult<Self> {
        if let Some(prefix) = path.strip_suffix("/*") {
            return Ok(Self::Wildcard {
                prefix: prefix.to_owned(),
            });
        }
        if !PLACEHOLDER.is_match(path) {
            return Ok(Self::Exact);
        }

        let mut source = String::from("^");
        let mut names = Vec::new();
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(path) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            source.push_str(&regex::escape(&path[last..whole.start()]));
            source.push_str("([^/]+)");
            names.push(name.as_str().to_owned());
            last = whole.end();
        }
        source.push_str(&regex::escape(&path[last..]));
        source.push('$');

        let regex = Regex::new(&source).map_err(|source| JoltError::InvalidPattern {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::Parameterized { regex, names })
    }

    pub(crate) fn tier(&self) -> Tier {
        match self {
            Self::Exact => Tier::Exact,
            Self::Parameterized { .. } => Tier::Parameterized,
            Self::Wildcard { .. } => Tier::Wildcard,
        }
    }

    /// Matches a normalized request path. `literal` is the route's own
    /// normalized path, used by the exact tier.
    pub(crate) fn matches(&self, literal: &str, path: &str) -> Option<Parameters> {
        match self {
            Self::Exact => (literal == path).then(Parameters::new),
            Self::Parameterized { regex, names } => {
                let caps = regex.captures(path)?;
                let params = names
                    .iter()
                    .zip(caps.iter().skip(1))
                    .filter_map(|(name, m)| Some((name.clone(), m?.as_str().to_owned())))
                    .collect();
                Some(params)
            }
            Self::Wildcard { prefix } => {
                let rest = path.strip_prefix(prefix.as_str())?;
                if !rest.is_empty() && !rest.starts_with('/') {
                    return None;
                }
                let mut params = Parameters::new();
                params.insert("wildcard", rest);
                Some(params)
            }
        }
    }
}

/// Match precedence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Exact,
    Parameterized,
    Wildcard,
}
