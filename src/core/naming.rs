//! core::naming
//!
//! Name normalization for commands and options.
//!
//! Commands are addressed in kebab case on the command line regardless of how
//! they were declared, and option flags are derived from parameter names the
//! same way.

/// Normalize a name to kebab case.
///
/// - ASCII letters are lowercased
/// - `_`, spaces and existing `-` become a single `-`
/// - A lowercase letter or digit followed by an uppercase letter starts a new word
/// - Leading and trailing separators are dropped
///
/// Other characters are passed through untouched; validation is left to the
/// caller.
///
/// # Example
///
/// ```
/// use lectern::core::naming::kebab_case;
///
/// assert_eq!(kebab_case("deploy_service"), "deploy-service");
/// assert_eq!(kebab_case("DeployService"), "deploy-service");
/// assert_eq!(kebab_case("  dry  run "), "dry-run");
/// ```
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;

    for c in name.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
        } else if c.is_ascii_uppercase() {
            let boundary = matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit());
            if boundary && !out.ends_with('-') {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }

    while out.ends_with('-') {
        out.pop();
    }

    out
}
