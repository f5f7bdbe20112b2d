//! Rewriting of `:name` placeholders into the positional `$n` form
//! PostgreSQL expects.

/// A statement rewritten to positional placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalSql {
    pub sql: String,
    /// Placeholder names; the name at index `i` binds to `$(i + 1)`
    pub names: Vec<String>,
}

impl PositionalSql {
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Rewrites every `:name` outside quotes to `$n`.
///
/// Repeated names share one position. `::` casts are left untouched.
pub fn to_positional(sql: &str) -> PositionalSql {
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((_, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            ':' => match chars.peek().copied() {
                Some((_, ':')) => {
                    out.push_str("::");
                    chars.next();
                }
                Some((start, next)) if next.is_ascii_alphabetic() || next == '_' => {
                    let mut end = start;
                    while let Some((i, ch)) = chars.peek().copied() {
                        if ch.is_ascii_alphanumeric() || ch == '_' {
                            end = i + ch.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let name = &sql[start..end];
                    let position = match names.iter().position(|n| n == name) {
                        Some(p) => p,
                        None => {
                            names.push(name.to_string());
                            names.len() - 1
                        }
                    };
                    out.push('$');
                    out.push_str(&(position + 1).to_string());
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }

    PositionalSql { sql: out, names }
}
