//! Redis-style glob matching for key scans.
//!
//! Supports `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes.

/// Check whether `key` matches the glob `pattern`.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    match_bytes(pattern.as_bytes(), key.as_bytes())
}

fn match_bytes(mut pattern: &[u8], mut key: &[u8]) -> bool {
    while let Some(&p) = pattern.first() {
        match p {
            b'*' => {
                // Collapse consecutive stars
                while pattern.first() == Some(&b'*') {
                    pattern = &pattern[1..];
                }
                if pattern.is_empty() {
                    return true;
                }
                return (0..=key.len()).any(|skip| match_bytes(pattern, &key[skip..]));
            }
            b'?' => {
                if key.is_empty() {
                    return false;
                }
                pattern = &pattern[1..];
                key = &key[1..];
            }
            b'[' => {
                let Some(&c) = key.first() else {
                    return false;
                };
                let (matched, rest) = match_class(&pattern[1..], c);
                if !matched {
                    return false;
                }
                pattern = rest;
                key = &key[1..];
            }
            b'\\' if pattern.len() >= 2 => {
                if key.first() != Some(&pattern[1]) {
                    return false;
                }
                pattern = &pattern[2..];
                key = &key[1..];
            }
            _ => {
                if key.first() != Some(&p) {
                    return false;
                }
                pattern = &pattern[1..];
                key = &key[1..];
            }
        }
    }
    key.is_empty()
}

/// Match `c` against a character class body (after `[`).
/// Returns whether it matched and the pattern remaining after `]`.
fn match_class(mut class: &[u8], c: u8) -> (bool, &[u8]) {
    let negate = class.first() == Some(&b'^');
    if negate {
        class = &class[1..];
    }

    let mut matched = false;
    loop {
        match class {
            [] => break,
            [b']', rest @ ..] => {
                class = rest;
                return (matched != negate, class);
            }
            [b'\\', escaped, rest @ ..] => {
                matched |= *escaped == c;
                class = rest;
            }
            [lo, b'-', hi, rest @ ..] if *hi != b']' => {
                let (lo, hi) = if lo <= hi { (*lo, *hi) } else { (*hi, *lo) };
                matched |= (lo..=hi).contains(&c);
                class = rest;
            }
            [single, rest @ ..] => {
                matched |= *single == c;
                class = rest;
            }
        }
    }
    // Unterminated class: treat what we saw as the whole class
    (matched != negate, class)
}
