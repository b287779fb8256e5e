//! SQL statement obfuscation.
//!
//! A single-pass lexer over the statement text: string and numeric
//! literals become `?`, comments are dropped, whitespace runs collapse to
//! one space. Identifiers and keywords pass through, optionally with their
//! digits masked. The lexer understands the T-SQL quirks the scraper runs
//! into: `N'...'` unicode strings, `''` quote escapes, bracketed
//! identifiers, and `@`-prefixed variables.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::OnceLock;

use crate::ObfuscateError;

/// Obfuscator behavior flags.
///
/// The defaults are the fixed profile the scraper uses; they exist as
/// flags so tests can pin individual behaviors.
#[derive(Debug, Clone)]
pub struct SqlConfig {
    /// Mask digits embedded in identifiers (`users123` becomes `users?`).
    pub replace_digits: bool,
    /// Collect statement-leading command keywords as metadata.
    pub collect_commands: bool,
    /// Collect procedure names following `EXEC`/`EXECUTE` as metadata.
    pub collect_procedures: bool,
    /// Keep `AS` aliases; when false they are stripped from the output.
    pub keep_sql_alias: bool,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            replace_digits: true,
            collect_commands: true,
            collect_procedures: true,
            keep_sql_alias: true,
        }
    }
}

/// An obfuscated statement plus collected metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObfuscatedQuery {
    /// The obfuscated statement text.
    pub query: String,
    /// Leading command keywords, uppercased, in statement order.
    pub commands: Vec<String>,
    /// Procedure names seen after `EXEC`/`EXECUTE`.
    pub procedures: Vec<String>,
}

/// Statement obfuscator configured with a [`SqlConfig`].
#[derive(Debug, Clone, Default)]
pub struct SqlObfuscator {
    config: SqlConfig,
}

const COMMAND_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "EXEC", "EXECUTE", "CREATE", "ALTER", "DROP", "BEGIN",
    "COMMIT", "ROLLBACK", "TRUNCATE", "MERGE", "DECLARE", "SET", "WITH", "USE",
];

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || matches!(c, '_' | '@' | '#' | '$')
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '@' | '#' | '$' | '.')
}

impl SqlObfuscator {
    /// Create an obfuscator with explicit flags.
    #[must_use]
    pub fn new(config: SqlConfig) -> Self {
        Self { config }
    }

    /// Obfuscate a statement, returning the text and collected metadata.
    pub fn obfuscate(&self, sql: &str) -> Result<ObfuscatedQuery, ObfuscateError> {
        let mut out = String::with_capacity(sql.len());
        let mut commands = Vec::new();
        let mut procedures = Vec::new();

        let mut chars = sql.chars().peekable();
        // True at the start of the text and after every ';'.
        let mut statement_start = true;
        let mut expect_procedure = false;
        let mut skip_alias_ident = false;

        while let Some(c) = chars.next() {
            match c {
                '-' if chars.peek() == Some(&'-') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                    push_space(&mut out);
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    Self::consume_block_comment(&mut chars)?;
                    push_space(&mut out);
                }
                '\'' => {
                    Self::consume_string(&mut chars)?;
                    // Fold the N of an N'...' unicode literal into the placeholder.
                    if matches!(out.chars().last(), Some('N') | Some('n'))
                        && !out[..out.len() - 1].ends_with(is_ident_part)
                    {
                        out.pop();
                    }
                    out.push('?');
                    statement_start = false;
                    expect_procedure = false;
                }
                '[' => {
                    out.push('[');
                    for c in chars.by_ref() {
                        if self.config.replace_digits && c.is_ascii_digit() {
                            if !out.ends_with('?') {
                                out.push('?');
                            }
                        } else {
                            out.push(c);
                        }
                        if c == ']' {
                            break;
                        }
                    }
                    statement_start = false;
                    expect_procedure = false;
                }
                c if c.is_ascii_digit() => {
                    Self::consume_number(&mut chars, c);
                    out.push('?');
                    statement_start = false;
                    expect_procedure = false;
                }
                c if is_ident_start(c) => {
                    let word = Self::read_word(&mut chars, c);
                    let upper = word.to_ascii_uppercase();

                    if !self.config.keep_sql_alias {
                        if skip_alias_ident {
                            skip_alias_ident = false;
                            continue;
                        }
                        if upper == "AS" {
                            skip_alias_ident = true;
                            continue;
                        }
                    }

                    if expect_procedure {
                        procedures.push(word.clone());
                        expect_procedure = false;
                    } else if matches!(upper.as_str(), "EXEC" | "EXECUTE") {
                        expect_procedure = self.config.collect_procedures;
                    }

                    if statement_start
                        && self.config.collect_commands
                        && COMMAND_KEYWORDS.contains(&upper.as_str())
                    {
                        commands.push(upper);
                    }
                    statement_start = false;

                    if self.config.replace_digits {
                        out.push_str(&mask_digits(&word));
                    } else {
                        out.push_str(&word);
                    }
                }
                ';' => {
                    out.push(';');
                    statement_start = true;
                    expect_procedure = false;
                }
                c if c.is_whitespace() => push_space(&mut out),
                c => {
                    out.push(c);
                    expect_procedure = false;
                }
            }
        }

        Ok(ObfuscatedQuery {
            query: out.trim().to_string(),
            commands,
            procedures,
        })
    }

    fn consume_string(chars: &mut Peekable<Chars<'_>>) -> Result<(), ObfuscateError> {
        while let Some(c) = chars.next() {
            if c == '\'' {
                // '' is an escaped quote inside the literal.
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    continue;
                }
                return Ok(());
            }
        }
        Err(ObfuscateError::UnterminatedLiteral)
    }

    fn consume_block_comment(chars: &mut Peekable<Chars<'_>>) -> Result<(), ObfuscateError> {
        while let Some(c) = chars.next() {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                return Ok(());
            }
        }
        Err(ObfuscateError::UnterminatedComment)
    }

    fn consume_number(chars: &mut Peekable<Chars<'_>>, first: char) {
        // 0x... hex literals (plan handles, context_info)
        if first == '0' && matches!(chars.peek(), Some('x' | 'X')) {
            chars.next();
            while chars.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                chars.next();
            }
            return;
        }
        while chars
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E'))
        {
            chars.next();
        }
    }

    fn read_word(chars: &mut Peekable<Chars<'_>>, first: char) -> String {
        let mut word = String::new();
        word.push(first);
        while chars.peek().copied().is_some_and(is_ident_part) {
            word.push(chars.next().unwrap_or_default());
        }
        word
    }
}

fn push_space(out: &mut String) {
    if !out.is_empty() && !out.ends_with(' ') {
        out.push(' ');
    }
}

/// Replace every digit run in a word with a single `?`.
fn mask_digits(word: &str) -> String {
    let mut masked = String::with_capacity(word.len());
    for c in word.chars() {
        if c.is_ascii_digit() {
            if !masked.ends_with('?') {
                masked.push('?');
            }
        } else {
            masked.push(c);
        }
    }
    masked
}

static OBFUSCATOR: OnceLock<SqlObfuscator> = OnceLock::new();

/// Obfuscate a statement with the process-wide default-profile obfuscator.
///
/// The obfuscator is initialized on first use and shared afterwards;
/// initialization is idempotent.
pub fn obfuscate_sql(sql: &str) -> Result<String, ObfuscateError> {
    OBFUSCATOR
        .get_or_init(SqlObfuscator::default)
        .obfuscate(sql)
        .map(|obfuscated| obfuscated.query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obfuscate(sql: &str) -> ObfuscatedQuery {
        SqlObfuscator::default().obfuscate(sql).unwrap()
    }

    #[test]
    fn test_string_literals_replaced() {
        assert_eq!(
            obfuscate("SELECT * FROM users WHERE name = 'Alice'").query,
            "SELECT * FROM users WHERE name = ?"
        );
    }

    #[test]
    fn test_escaped_quote_inside_literal() {
        assert_eq!(
            obfuscate("SELECT * FROM users WHERE name = 'O''Brien'").query,
            "SELECT * FROM users WHERE name = ?"
        );
    }

    #[test]
    fn test_unicode_literal_prefix_folded() {
        assert_eq!(
            obfuscate("SELECT * FROM t WHERE v = N'secret'").query,
            "SELECT * FROM t WHERE v = ?"
        );
    }

    #[test]
    fn test_numbers_replaced() {
        assert_eq!(
            obfuscate("SELECT * FROM t WHERE id = 123 AND score > 4.5").query,
            "SELECT * FROM t WHERE id = ? AND score > ?"
        );
    }

    #[test]
    fn test_hex_literal_replaced() {
        assert_eq!(
            obfuscate("SELECT * FROM t WHERE h = 0x1A2B3C").query,
            "SELECT * FROM t WHERE h = ?"
        );
    }

    #[test]
    fn test_comments_stripped() {
        assert_eq!(
            obfuscate("SELECT * -- trailing\nFROM t /* block */ WHERE x = 1").query,
            "SELECT * FROM t WHERE x = ?"
        );
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(
            obfuscate("SELECT\t*\n  FROM   t").query,
            "SELECT * FROM t"
        );
    }

    #[test]
    fn test_digits_masked_in_identifiers() {
        assert_eq!(
            obfuscate("SELECT * FROM users123 WHERE id = 1").query,
            "SELECT * FROM users? WHERE id = ?"
        );
        assert_eq!(
            obfuscate("SELECT * FROM [tbl42]").query,
            "SELECT * FROM [tbl?]"
        );
    }

    #[test]
    fn test_digits_kept_without_replace_digits() {
        let obfuscator = SqlObfuscator::new(SqlConfig {
            replace_digits: false,
            ..SqlConfig::default()
        });
        assert_eq!(
            obfuscator.obfuscate("SELECT * FROM users123").unwrap().query,
            "SELECT * FROM users123"
        );
    }

    #[test]
    fn test_collect_commands() {
        let obfuscated = obfuscate("SELECT 1; UPDATE t SET x = 2");
        assert_eq!(obfuscated.commands, vec!["SELECT", "UPDATE"]);
    }

    #[test]
    fn test_collect_procedures() {
        let obfuscated = obfuscate("EXEC dbo.sp_who2");
        assert_eq!(obfuscated.procedures, vec!["dbo.sp_who2"]);
        assert_eq!(obfuscated.commands, vec!["EXEC"]);
    }

    #[test]
    fn test_alias_kept_by_default() {
        assert_eq!(
            obfuscate("SELECT a AS b FROM t").query,
            "SELECT a AS b FROM t"
        );
    }

    #[test]
    fn test_alias_stripped_when_disabled() {
        let obfuscator = SqlObfuscator::new(SqlConfig {
            keep_sql_alias: false,
            ..SqlConfig::default()
        });
        assert_eq!(
            obfuscator.obfuscate("SELECT a AS b FROM t").unwrap().query,
            "SELECT a FROM t"
        );
    }

    #[test]
    fn test_unterminated_literal_is_error() {
        let err = SqlObfuscator::default()
            .obfuscate("SELECT 'oops")
            .unwrap_err();
        assert_eq!(err, ObfuscateError::UnterminatedLiteral);
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        let err = SqlObfuscator::default()
            .obfuscate("SELECT 1 /* oops")
            .unwrap_err();
        assert_eq!(err, ObfuscateError::UnterminatedComment);
    }

    #[test]
    fn test_variables_pass_through() {
        assert_eq!(
            obfuscate("SELECT * FROM t WHERE id = @p1").query,
            "SELECT * FROM t WHERE id = @p?"
        );
    }

    #[test]
    fn test_global_obfuscator_deterministic() {
        let first = obfuscate_sql("SELECT * FROM t WHERE id = 9").unwrap();
        let second = obfuscate_sql("SELECT * FROM t WHERE id = 9").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "SELECT * FROM t WHERE id = ?");
    }
}
