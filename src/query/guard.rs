//! Read-only guard for generated SQL.
//!
//! Works on the `sqlparser` token stream rather than the raw text, so keywords inside
//! comments, string literals and quoted identifiers never trigger a rejection, and
//! comments can't hide a keyword from the check either.

use crate::types::{ChatError, Result};
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Words that may not appear unquoted anywhere in an accepted statement.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "GRANT", "EXEC", "EXECUTE",
    "CREATE", "MERGE", "REVOKE", "CALL", "COPY", "INTO",
];

/// Statement keywords an accepted query may start with.
const ALLOWED_LEADING: &[&str] = &["SELECT", "WITH"];

fn significant(token: &Token) -> bool {
    !matches!(token, Token::Whitespace(_) | Token::EOF)
}

/// Check that `sql` is a single read-only `SELECT` / `WITH` statement.
///
/// # Errors
///
/// Returns `ChatError::UnsafeQuery` carrying the SQL and the reason for rejection
pub fn validate(sql: &str) -> Result<()> {
    let reject = |reason: String| Err(ChatError::unsafe_query(sql, reason));

    let dialect = GenericDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => return reject(format!("could not tokenize SQL: {}", e)),
    };

    let significant_tokens: Vec<&Token> = tokens.iter().filter(|t| significant(t)).collect();

    // leading parentheses are fine: `(SELECT 1) UNION (SELECT 2)`
    let first_word = significant_tokens
        .iter()
        .find(|t| !matches!(t, Token::LParen));
    match first_word {
        None => return reject("empty statement".to_string()),
        Some(Token::Word(w)) if w.quote_style.is_none()
            && ALLOWED_LEADING.contains(&w.value.to_ascii_uppercase().as_str()) => {}
        Some(other) => {
            return reject(format!("statement must start with SELECT or WITH, found {}", other))
        }
    }

    for (idx, token) in significant_tokens.iter().enumerate() {
        match token {
            Token::SemiColon if idx + 1 < significant_tokens.len() => {
                return reject("multiple statements are not allowed".to_string());
            }
            Token::Word(w) if w.quote_style.is_none() => {
                let upper = w.value.to_ascii_uppercase();
                if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                    return reject(format!("forbidden keyword {}", upper));
                }
            }
            _ => {}
        }
    }

    Ok(())
}
