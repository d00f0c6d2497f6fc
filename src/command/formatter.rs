//! Turns a command description into a well-formed argument vector.
//!
//! Accepts either a ready-made argument list or a single command string.
//! String input is tokenized by precedence: pre-quoted `=`-assignments are
//! trusted and kept verbatim, everything else is escaped so each token is
//! safe to pass as a single argv slot.

use std::borrow::Cow;

use regex::Regex;

/// Token pattern, one alternative per tokenization rule. Alternation order
/// is match precedence: quoted assignments before unquoted ones, flags
/// before bare words, standalone quoted strings last.
const TOKEN_PATTERN: &str = concat!(
    r#"(?P<sq_assign>(?:--?)?[A-Za-z0-9][\w.-]*='(?:\\'|[^'])*')"#,
    r#"|(?P<dq_assign>(?:--?)?[A-Za-z0-9][\w.-]*="(?:\\"|[^"])*")"#,
    r#"|(?P<bare_assign>(?:--?)?[A-Za-z0-9][\w.-]*=[^\s'"]+)"#,
    r#"|(?P<flag>--?[A-Za-z0-9][\w.-]*)"#,
    r#"|(?P<word>[^\s'"]+)"#,
    r#"|(?P<dq>"(?:\\"|[^"])*")"#,
    r#"|(?P<sq>'(?:\\'|[^'])*')"#,
);

/// Formats command descriptions into argument vectors.
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    token_re: Regex,
}

impl Default for CommandFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandFormatter {
    /// Create a formatter with the standard token grammar.
    #[must_use]
    pub fn new() -> Self {
        let token_re = Regex::new(TOKEN_PATTERN).expect("token pattern is valid");
        Self { token_re }
    }

    /// Pass an argument list through, dropping empty-string elements.
    ///
    /// The literal `"0"` is a meaningful argument in many grammars and is
    /// retained; only true empty strings are dropped.
    #[must_use]
    pub fn format_args(&self, args: &[String]) -> Vec<String> {
        args.iter()
            .filter(|arg| !arg.is_empty())
            .cloned()
            .collect()
    }

    /// Tokenize a single command string into escaped argument slots.
    ///
    /// Assignments whose value is already wrapped in matching quotes are
    /// re-emitted untouched; the caller's quoting is trusted. All other
    /// tokens are escaped for safe consumption as one argv slot. Input
    /// with no recognizable tokens yields an empty vector.
    #[must_use]
    pub fn format_str(&self, command: &str) -> Vec<String> {
        self.token_re
            .captures_iter(command)
            .filter_map(|caps| {
                if let Some(m) = caps.name("sq_assign").or_else(|| caps.name("dq_assign")) {
                    Some(m.as_str().to_string())
                } else {
                    caps.get(0).map(|m| escape_token(m.as_str()))
                }
            })
            .collect()
    }
}

fn escape_token(token: &str) -> String {
    shell_escape::escape(Cow::from(token)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt() -> CommandFormatter {
        CommandFormatter::new()
    }

    #[test]
    fn args_drop_empty_strings_but_keep_zero() {
        let args: Vec<String> = ["--name=value", "", "0", "flag"]
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(fmt().format_args(&args), vec!["--name=value", "0", "flag"]);
    }

    #[test]
    fn args_pass_through_unchanged_otherwise() {
        let args: Vec<String> = ["ls", "-la", "/tmp"].iter().map(ToString::to_string).collect();
        assert_eq!(fmt().format_args(&args), args);
    }

    #[test]
    fn str_quoted_assignment_kept_verbatim() {
        let tokens = fmt().format_str(r"--opt='a \'b\' c' -f bare");

        assert_eq!(tokens, vec![r"--opt='a \'b\' c'", "-f", "bare"]);
    }

    #[test]
    fn str_double_quoted_assignment_kept_verbatim() {
        let tokens = fmt().format_str(r#"--path="a \"b\" c""#);
        assert_eq!(tokens, vec![r#"--path="a \"b\" c""#]);
    }

    #[test]
    fn str_unquoted_assignment_is_escaped_whole() {
        let tokens = fmt().format_str("--name=plain");
        assert_eq!(tokens, vec!["--name=plain"]);
    }

    #[test]
    fn str_bare_word_with_specials_is_escaped() {
        let tokens = fmt().format_str("a;b");
        assert_eq!(tokens, vec!["'a;b'"]);
    }

    #[test]
    fn str_standalone_quoted_string_is_one_token() {
        let tokens = fmt().format_str(r#"run "two words" done"#);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], "run");
        assert_eq!(tokens[2], "done");
    }

    #[test]
    fn str_empty_input_yields_empty_vector() {
        assert!(fmt().format_str("").is_empty());
        assert!(fmt().format_str("   ").is_empty());
    }

    #[test]
    fn str_flags_survive_unquoted() {
        let tokens = fmt().format_str("-v --long-flag");
        assert_eq!(tokens, vec!["-v", "--long-flag"]);
    }
}
