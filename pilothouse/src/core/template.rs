//! Placeholder substitution for run-file templates.
//!
//! Templates carry `{{key}}` tokens. Population is a single left-to-right
//! pass: substituted values are never rescanned, and tokens with no matching
//! variable are copied through untouched.

use std::collections::BTreeMap;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Replace every `{{key}}` token whose key is present in `variables`.
pub fn populate_template(template: &str, variables: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after_open[..end];
        match variables.get(key) {
            Some(value) => out.push_str(value),
            None => {
                out.push_str(OPEN);
                out.push_str(key);
                out.push_str(CLOSE);
            }
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    out
}
