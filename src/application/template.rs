// Query template engine - named placeholder substitution
use crate::domain::filter::FilterParams;
use serde::Deserialize;

/// What to do with a placeholder whose name has no parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingParam {
    /// Leave `{name}` in the output untouched.
    #[default]
    Keep,
    /// Substitute an empty string.
    Empty,
}

/// Replace `{name}` and `${name}` placeholders with parameter values.
///
/// Multi-valued parameters are joined with `,`. Braces that do not enclose a valid name
/// (`[A-Za-z0-9_.-]+`) are copied as-is.
///
/// Values are inserted verbatim with no quoting or escaping. This is only acceptable
/// while the callers are trusted console operators: anything that can set a URL
/// parameter can rewrite the query.
pub fn render(template: &str, params: &FilterParams, missing: MissingParam) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|i| open + i) else {
            break;
        };
        let name = &rest[open + 1..close];
        if !is_placeholder_name(name) {
            out.push_str(&rest[..=open]);
            rest = &rest[open + 1..];
            continue;
        }

        let dollar = rest[..open].ends_with('$');
        let prefix_end = if dollar { open - 1 } else { open };
        out.push_str(&rest[..prefix_end]);

        match (params.get(name), missing) {
            (Some(value), _) => out.push_str(&value.joined()),
            (None, MissingParam::Keep) => out.push_str(&rest[prefix_end..=close]),
            (None, MissingParam::Empty) => {}
        }
        rest = &rest[close + 1..];
    }

    out.push_str(rest);
    out
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
