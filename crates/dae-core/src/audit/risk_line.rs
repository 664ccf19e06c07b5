//! Compliance risk line formatting.
//!
//! The textual shape is a contract with external tooling. Changing it
//! requires bumping [`RISK_LINE_VERSION`].

/// Version of the risk line shape.
pub const RISK_LINE_VERSION: u32 = 1;

/// `tracing` target the risk line is emitted under.
pub const COMPLIANCE_TARGET: &str = "dae::compliance";

/// Formats the risk line.
///
/// - the engine name is upper-cased and suffixed with `_RISKS`
/// - `source_systems` is rendered as a tuple: `()`, `('a',)`, `('a', 'b')`
/// - `risks` is rendered as a list in the given order: `['m1', 'm2']`
///
/// Strings are single-quoted with `\\`, `'`, newline and tab escaped.
/// Callers pass source systems already sorted.
#[must_use]
pub fn format_risk_line(
    engine: &str,
    dataset_version_id: &str,
    source_systems: &[String],
    risks: &[String],
) -> String {
    let tuple = match source_systems {
        [] => "()".to_string(),
        [only] => format!("({},)", quote(only)),
        many => format!(
            "({})",
            many.iter().map(|s| quote(s)).collect::<Vec<_>>().join(", ")
        ),
    };
    let list = risks.iter().map(|s| quote(s)).collect::<Vec<_>>().join(", ");
    format!(
        "{}_RISKS dataset_version_id={} source_systems={} risks=[{}]",
        engine.to_uppercase(),
        dataset_version_id,
        tuple,
        list
    )
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
