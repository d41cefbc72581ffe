/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Strip every trailing `/` so paths can be appended with a leading slash
pub fn trim_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Initials for an avatar placeholder: first letter of the first and last
/// word, upper-cased. A single word gives one letter.
pub fn initials(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    let first_letter = |w: &str| w.chars().next().map(|c| c.to_uppercase().collect::<String>());
    match words.as_slice() {
        [] => String::new(),
        [only] => first_letter(*only).unwrap_or_default(),
        [first, .., last] => format!(
            "{}{}",
            first_letter(*first).unwrap_or_default(),
            first_letter(*last).unwrap_or_default()
        ),
    }
}
