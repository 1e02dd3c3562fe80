use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::{Error, Result};

/// Minimum length of trimmed code, in characters.
pub const MIN_CODE_LENGTH: usize = 10;
/// Maximum length of trimmed code, in characters.
pub const MAX_CODE_LENGTH: usize = 5000;

/// Root modules that may never be imported.
const DANGEROUS_IMPORTS: &[&str] = &[
    "os", "sys", "subprocess", "importlib", "exec", "eval", "open", "file", "__import__",
    "globals", "locals", "compile", "execfile", "input", "raw_input",
];

/// Call prefixes rejected anywhere in the (lowercased) source.
const DANGEROUS_CALLS: &[&str] = &[
    "exec(", "eval(", "compile(", "__import__(", "globals(", "locals(", "vars(", "dir(",
    "getattr(", "setattr(", "delattr(", "hasattr(", "input(", "raw_input(",
];

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(import|from)[ \t]+([^\n]+)").unwrap());

static FILE_OPERATION_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"open\s*\(",
        r"file\s*\(",
        r"\.write\s*\(",
        r"\.read\s*\(",
        r"\.readlines\s*\(",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

const NETWORK_MARKERS: &[&str] = &["urllib", "requests", "http", "socket"];

/// Pattern-based scanner for submitted Manim scene code.
///
/// All checks run on a lowercased copy of the trimmed source, in a fixed
/// order, and the first failing check decides the error message.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeSafetyValidator;

impl CodeSafetyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate `code`, returning the trimmed source on success.
    pub fn validate(&self, code: &str) -> Result<String> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::validation("Code cannot be empty"));
        }

        let length = code.chars().count();
        if length < MIN_CODE_LENGTH {
            return Err(Error::validation("Code is too short to be valid"));
        }
        if length > MAX_CODE_LENGTH {
            return Err(Error::validation(format!(
                "Code exceeds maximum length of {MAX_CODE_LENGTH} characters"
            )));
        }

        let lower = code.to_lowercase();

        if let Some(module) = self.dangerous_import(&lower) {
            return Err(Error::validation(format!(
                "Dangerous import detected: {module}"
            )));
        }

        if let Some(call) = DANGEROUS_CALLS.iter().find(|call| lower.contains(*call)) {
            return Err(Error::validation(format!(
                "Dangerous function detected: {}",
                call.trim_end_matches('(')
            )));
        }

        if FILE_OPERATION_RES.iter().any(|re| re.is_match(&lower)) {
            return Err(Error::validation(
                "File operations are not allowed in animation code",
            ));
        }

        if NETWORK_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return Err(Error::validation(
                "Network operations are not allowed in animation code",
            ));
        }

        if !lower.contains("from manim import") && !lower.contains("import manim") {
            return Err(Error::validation("Code must import manim"));
        }
        if !lower.contains("class ") {
            return Err(Error::validation("Code must define a Scene class"));
        }
        if !lower.contains("def construct") {
            return Err(Error::validation("Code must have a construct method"));
        }

        debug!(length, "Code passed safety screening");
        Ok(code.to_string())
    }

    /// First denylisted root module named by an import statement.
    ///
    /// `from a.b import c` is checked against `a`; `import a.b, c as d` is
    /// checked against both `a` and `c`.
    fn dangerous_import(&self, lower: &str) -> Option<String> {
        for caps in IMPORT_RE.captures_iter(lower) {
            let keyword = &caps[1];
            let rest = caps[2].trim();

            let targets: Vec<&str> = if keyword == "from" {
                rest.split_whitespace().next().into_iter().collect()
            } else {
                rest.split(',')
                    .filter_map(|part| part.split_whitespace().next())
                    .collect()
            };

            for target in targets {
                let root = target.split('.').next().unwrap_or(target);
                if DANGEROUS_IMPORTS.contains(&root) {
                    return Some(target.to_string());
                }
            }
        }
        None
    }
}
