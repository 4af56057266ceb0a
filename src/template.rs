pub const FALLBACK_TEMPLATE: &str = "Generate a JSON object based on the following input:\n{input}";

/// Resolves the single placeholder of a prompt template.
///
/// Precedence: `{}`, then `{input}`, then the first `{identifier}`. Templates
/// without a placeholder get the input appended under an `Input:` label. The
/// template is never treated as a format string, so stray braces survive.
pub fn substitute(template: &str, input: &str) -> String {
    if template.contains("{}") {
        return template.replacen("{}", input, 1);
    }

    if template.contains("{input}") {
        return template.replacen("{input}", input, 1);
    }

    if let Some((start, end)) = find_named_placeholder(template) {
        let mut out = String::with_capacity(template.len() + input.len());
        out.push_str(&template[..start]);
        out.push_str(input);
        out.push_str(&template[end..]);
        return out;
    }

    format!("{template}\n\nInput: {input}")
}

/// Byte range of the first `{[A-Za-z0-9_]+}` in `template`.
fn find_named_placeholder(template: &str) -> Option<(usize, usize)> {
    let bytes = template.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] != b'{' {
            index += 1;
            continue;
        }

        let name_len = bytes[index + 1..]
            .iter()
            .take_while(|byte| byte.is_ascii_alphanumeric() || **byte == b'_')
            .count();
        let close = index + 1 + name_len;
        if name_len > 0 && bytes.get(close) == Some(&b'}') {
            return Some((index, close + 1));
        }
        index += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_braces_win_over_named_placeholder() {
        let out = substitute("Use {} for {name}", "X");
        assert_eq!(out, "Use X for {name}");
    }

    #[test]
    fn only_first_empty_brace_pair_is_replaced() {
        assert_eq!(substitute("{} and {}", "a"), "a and {}");
    }

    #[test]
    fn input_placeholder_precedes_other_identifiers() {
        let out = substitute("{name} said {input}", "hi");
        assert_eq!(out, "{name} said hi");
    }

    #[test]
    fn first_named_placeholder_is_replaced() {
        assert_eq!(substitute("Hello {name}", "Bob"), "Hello Bob");
        assert_eq!(substitute("{a} then {b}", "x"), "x then {b}");
    }

    #[test]
    fn json_braces_in_template_are_left_alone() {
        let template = r#"Return {"cause": "...", "effect": "..."} for {text}"#;
        let out = substitute(template, "rain");
        assert_eq!(out, r#"Return {"cause": "...", "effect": "..."} for rain"#);
    }

    #[test]
    fn template_without_placeholder_gets_input_appended() {
        let out = substitute("Extract causal pairs.", "Smoking causes cancer.");
        assert!(out.starts_with("Extract causal pairs."));
        assert!(out.ends_with("\nInput: Smoking causes cancer."));
    }

    #[test]
    fn named_placeholder_scan_skips_non_identifiers() {
        assert_eq!(find_named_placeholder("{ x } {a-b} {ok_1}"), Some((12, 18)));
        assert_eq!(find_named_placeholder("{"), None);
        assert_eq!(find_named_placeholder("{{}}"), None);
    }

    #[test]
    fn input_is_inserted_verbatim() {
        assert_eq!(substitute("Q: {}", "{input} $1 {}"), "Q: {input} $1 {}");
        assert_eq!(substitute("Q: {x}", "$0 ${1}"), "Q: $0 ${1}");
    }
}
