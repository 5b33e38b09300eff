//! Text codec for the environment-variable editor
//!
//! The interactive editor presents the configured variables as an editable
//! text document: one pass-through variable name per line, `KEY=value` for
//! fixed values, `#` comments ignored. This module is the pure codec behind
//! it; rendering and key handling live with the editor.

/// Variables as edited: names proxied from the host, and fixed `KEY=value`
/// pairs injected verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVarSet {
    pub pass_through: Vec<String>,
    pub fixed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub is_valid: bool,
    pub variable_count: usize,
    pub errors: Vec<String>,
}

/// Render a variable set as editor text. `parse` inverts this exactly for
/// comment-free input.
pub fn serialize(set: &EnvVarSet) -> String {
    let mut out = String::new();
    for name in &set.pass_through {
        out.push_str(name);
        out.push('\n');
    }
    for (key, value) in &set.fixed {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Parse editor text back into a variable set. Blank lines and `#` comments
/// are skipped; a line with an empty name before `=` is dropped.
pub fn parse(text: &str) -> EnvVarSet {
    let mut set = EnvVarSet::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                if !key.is_empty() {
                    set.fixed.push((key.to_string(), value.trim().to_string()));
                }
            }
            None => set.pass_through.push(line.to_string()),
        }
    }
    set
}

/// Validate editor text without committing it: counts variables and reports
/// each malformed line.
pub fn validate(text: &str) -> Validation {
    let mut result = Validation {
        is_valid: true,
        variable_count: 0,
        errors: Vec::new(),
    };
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, _)) = line.split_once('=') {
            if key.trim().is_empty() {
                result.is_valid = false;
                result
                    .errors
                    .push(format!("line {}: missing variable name", idx + 1));
                continue;
            }
        }
        result.variable_count += 1;
    }
    result
}
