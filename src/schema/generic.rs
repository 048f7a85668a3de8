//! `Base<Argument>` references.
//!
//! Hand-scanned rather than regex-matched: arguments may nest further generics
//! (`Punctuated<Pair<AstExpr>>`), array forms (`{ Token }`) and quoted
//! literals that themselves contain brackets or commas (`Token<",">`).

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericTypeReference {
    pub base_type: String,
    pub argument: String,
}

/// Tracks quoting while scanning so delimiters inside literals are ignored.
#[derive(Default)]
struct Scanner {
    quote: Option<char>,
    escaped: bool,
}

impl Scanner {
    /// Feed one char; true when it is outside any quoted literal.
    fn step(&mut self, c: char) -> bool {
        if let Some(q) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == q {
                self.quote = None;
            }
            return false;
        }
        if c == '"' || c == '\'' {
            self.quote = Some(c);
            return false;
        }
        true
    }

    fn in_literal(&self) -> bool { self.quote.is_some() }
}

/// Parse `Base<Argument>`. The first unquoted `<` opens, the last `>` in the
/// string closes; the argument must be bracket-balanced.
pub fn parse_generic(text: &str) -> Option<GenericTypeReference> {
    let text = text.trim();
    let mut scanner = Scanner::default();
    let open = text
        .char_indices()
        .find(|&(_, c)| scanner.step(c) && c == '<')
        .map(|(i, _)| i)?;
    let close = text.rfind('>')?;
    if close <= open || !text[close + 1..].trim().is_empty() {
        return None;
    }

    let base_type = text[..open].trim();
    if base_type.is_empty() || !base_type.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
        return None;
    }

    let argument = &text[open + 1..close];
    if !is_balanced(argument) {
        return None;
    }
    Some(GenericTypeReference {
        base_type: base_type.to_string(),
        argument: argument.trim().to_string(),
    })
}

/// Split a generic argument on top-level commas.
pub fn split_arguments(argument: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut scanner = Scanner::default();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut prev = '\0';
    for c in argument.chars() {
        if scanner.step(c) {
            match c {
                '<' | '{' | '(' | '[' => depth += 1,
                '>' if prev != '-' => depth -= 1,
                '}' | ')' | ']' => depth -= 1,
                ',' if depth == 0 => {
                    out.push(current.trim().to_string());
                    current.clear();
                    prev = c;
                    continue;
                }
                _ => {}
            }
        }
        current.push(c);
        prev = c;
    }
    if !current.trim().is_empty() || !out.is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

fn is_balanced(argument: &str) -> bool {
    let mut scanner = Scanner::default();
    let mut stack: Vec<char> = Vec::new();
    let mut prev = '\0';
    for c in argument.chars() {
        if scanner.step(c) {
            match c {
                '<' | '{' | '(' | '[' => stack.push(c),
                // `->` in function types is not a closing bracket
                '>' if prev == '-' => {}
                '>' | '}' | ')' | ']' => {
                    let want = match c { '>' => '<', '}' => '{', ')' => '(', _ => '[' };
                    if stack.pop() != Some(want) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        prev = c;
    }
    stack.is_empty() && !scanner.in_literal()
}
