//! Reconciles free-text guesses against canonical article titles

/// Minimum length ratio for a substring match to count
const SUBSTRING_MIN_RATIO: f64 = 0.6;
/// Minimum edit-distance similarity for a typo to be forgiven
const TYPO_MIN_SIMILARITY: f64 = 0.85;

/// Check a guess against the correct title.
///
/// Three tiers, first hit wins:
/// 1. exact match after normalization
/// 2. one string contains the other and the shorter is at least 60% of the
///    longer; a guess made of one leading word plus the whole answer (a given
///    name before a surname) also counts
/// 3. Levenshtein similarity of at least 85%
pub fn check_answer(guess: &str, correct: &str) -> bool {
    let guess = normalize_title(guess);
    let correct = normalize_title(correct);

    if guess == correct {
        return true;
    }
    if guess.is_empty() || correct.is_empty() {
        return false;
    }

    let guess_len = guess.chars().count();
    let correct_len = correct.chars().count();
    let longer = guess_len.max(correct_len) as f64;
    let shorter = guess_len.min(correct_len) as f64;

    if correct.contains(&guess) || guess.contains(&correct) {
        if shorter / longer >= SUBSTRING_MIN_RATIO {
            return true;
        }
        // "Albert Einstein" for "Einstein"
        if is_qualified_name(&guess, &correct) {
            return true;
        }
    }

    let distance = levenshtein(&guess, &correct);
    let similarity = 1.0 - distance as f64 / longer;
    similarity >= TYPO_MIN_SIMILARITY
}

/// Lowercase, drop punctuation, collapse whitespace
pub fn normalize_title(title: &str) -> String {
    let stripped: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `guess` is exactly one extra leading word followed by `correct`
fn is_qualified_name(guess: &str, correct: &str) -> bool {
    match guess.strip_suffix(correct) {
        Some(prefix) => {
            let prefix = match prefix.strip_suffix(' ') {
                Some(prefix) => prefix,
                None => return false,
            };
            prefix.split_whitespace().count() == 1
        }
        None => false,
    }
}

/// Edit distance counting single-character insertions, deletions and substitutions
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j]
            } else {
                1 + previous[j].min(previous[j + 1]).min(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
