//! Small helpers shared across modules

use rand::Rng;
use rand::distr::Alphanumeric;

/// Convert arbitrary text into a string usable as an object key
///
/// Lowercases, collapses whitespace runs into `_`, and strips anything that
/// is not a word character.
pub fn to_id(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
        }
    }
    out
}

/// Random alphanumeric id of the given length
pub fn random_id(len: usize) -> String {
    rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_id() {
        assert_eq!(to_id("Stat Base"), "stat_base");
        assert_eq!(to_id("  Hit   Points!  "), "_hit_points_");
        assert_eq!(to_id("Dex (mod)"), "dex_mod");
        assert_eq!(to_id(""), "");
    }

    #[test]
    fn test_random_id() {
        let a = random_id(16);
        let b = random_id(16);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
