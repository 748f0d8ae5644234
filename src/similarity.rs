//! String similarity for suggestion ranking.
//!
//! Two measures are used. [`ratio`] is the Ratcliff/Obershelp matching ratio
//! and only shortlists candidates. [`score`] is the blended multi-factor
//! confidence reported to users.

use std::collections::HashSet;

/// Similarity of byte-identical names.
pub const EXACT: f64 = 1.0;
/// Similarity of names equal after dropping separators and case.
pub const FORMAT_VARIANT: f64 = 0.95;

/// Ratcliff/Obershelp similarity in `[0, 1]`: twice the number of matched
/// characters over the combined length.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + len..], &b[j + len..])
}

/// Longest common substring as `(start_a, start_b, len)`, earliest in `a`
/// then in `b` on ties.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut previous = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut current = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                current[j + 1] = previous[j] + 1;
                let len = current[j + 1];
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        previous = current;
    }
    best
}

/// Up to `limit` names from `pool` whose [`ratio`] to `word` is at least
/// `cutoff`, best first, ties in name order.
pub fn close_matches<'a, I>(word: &str, pool: I, limit: usize, cutoff: f64) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(f64, &str)> = pool
        .into_iter()
        .map(|candidate| (ratio(word, candidate), candidate))
        .filter(|(r, _)| *r >= cutoff)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(limit).map(|(_, c)| c).collect()
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Blended confidence that `used` was meant to be `candidate`.
///
/// Byte equality is [`EXACT`]; equality after normalization is
/// [`FORMAT_VARIANT`]. Otherwise the score weighs character-set overlap
/// (0.3), length closeness (0.2), substring containment (0.3) and
/// prefix/suffix containment (0.2), capped at [`FORMAT_VARIANT`].
pub fn score(used: &str, candidate: &str) -> f64 {
    if used == candidate {
        return EXACT;
    }
    let s1 = normalize(used);
    let s2 = normalize(candidate);
    if s1 == s2 {
        return FORMAT_VARIANT;
    }

    let set1: HashSet<char> = s1.chars().collect();
    let set2: HashSet<char> = s2.chars().collect();
    let union = set1.union(&set2).count();
    let char_overlap = if union == 0 {
        0.0
    } else {
        set1.intersection(&set2).count() as f64 / union as f64
    };

    let (len1, len2) = (s1.chars().count(), s2.chars().count());
    let longest = len1.max(len2);
    let length_closeness = if longest == 0 {
        1.0
    } else {
        1.0 - len1.abs_diff(len2) as f64 / longest as f64
    };

    let substring = if s1.contains(&s2) || s2.contains(&s1) {
        0.8
    } else if used
        .to_lowercase()
        .split(['_', '-'])
        .any(|token| token.chars().count() > 2 && s2.contains(token))
    {
        0.6
    } else {
        0.0
    };

    let affix = if s1.starts_with(&s2) || s2.starts_with(&s1) {
        0.7
    } else if s1.ends_with(&s2) || s2.ends_with(&s1) {
        0.6
    } else {
        0.0
    };

    let blended = char_overlap * 0.3 + length_closeness * 0.2 + substring * 0.3 + affix * 0.2;
    blended.clamp(0.0, FORMAT_VARIANT)
}
