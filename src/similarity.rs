//! Near-duplicate detection for task descriptions.
//!
//! Scores are `1 - levenshtein / max_len` over normalized text, with a
//! shortcut that treats a shared 40-character prefix as identical.

/// Normalized strings sharing this many leading characters score 1.
pub const SHARED_PREFIX_CHARS: usize = 40;

/// Default threshold for [`is_similar`].
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Lowercase, drop everything except ASCII word characters and whitespace, trim.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Similarity in `[0, 1]`. Empty input on either side (after normalization) scores 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let s1: Vec<char> = normalize(a).chars().collect();
    let s2: Vec<char> = normalize(b).chars().collect();

    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }

    if s1 == s2 || prefix(&s1) == prefix(&s2) {
        return 1.0;
    }

    let distance = levenshtein(&s1, &s2);
    1.0 - distance as f64 / s1.len().max(s2.len()) as f64
}

pub fn is_similar(a: &str, b: &str, threshold: f64) -> bool {
    similarity(a, b) >= threshold
}

fn prefix(s: &[char]) -> &[char] {
    &s[..s.len().min(SHARED_PREFIX_CHARS)]
}

fn levenshtein(s1: &[char], s2: &[char]) -> usize {
    let (len1, len2) = (s1.len(), s2.len());
    let mut matrix = vec![vec![0usize; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = usize::from(s1[i - 1] != s2[j - 1]);
            matrix[i][j] = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + cost);
        }
    }

    matrix[len1][len2]
}
