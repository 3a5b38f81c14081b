//! Input line tokenization and command-name suggestions.

/// Most suggestions offered for an unknown command.
const MAX_SUGGESTIONS: usize = 3;
/// Largest edit distance still considered a typo.
const MAX_TYPO_DISTANCE: usize = 2;

/// A command token and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub name: String,
    pub args: Vec<String>,
}

/// Split `line` into a command token and arguments.
///
/// Whitespace separates tokens; double quotes group a token containing
/// spaces and `\"` escapes a quote inside one. Returns `None` for a blank
/// line. An unterminated quote runs to the end of the line.
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    let mut tokens = tokenize(line).into_iter();
    let name = tokens.next()?;
    Some(ParsedLine {
        name,
        args: tokens.collect(),
    })
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Table names close to `name`: prefix matches first, then typos.
pub fn suggest<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    if name.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            if candidate.starts_with(name) {
                Some((0, candidate))
            } else {
                let distance = edit_distance(name, candidate);
                (distance <= MAX_TYPO_DISTANCE).then_some((distance, candidate))
            }
        })
        .collect();
    scored.sort();
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != *cb);
            row[j + 1] = substitute.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Parse `<file>:<line>`, splitting at the last colon.
pub fn parse_location(spec: &str) -> Option<(String, i64)> {
    let (file, line) = spec.rsplit_once(':')?;
    let line: i64 = line.parse().ok()?;
    if file.is_empty() || line < 1 {
        return None;
    }
    Some((file.to_string(), line))
}
