/// Case-insensitive substring test for a needle that is already lowercase.
/// An empty needle matches any haystack.
pub fn contains_lowered(haystack: &str, lowered_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowered_needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_regardless_of_haystack_case() {
        assert!(contains_lowered("GROCERY STORE X", "grocery"));
        assert!(contains_lowered("Grocery Store", "store"));
    }

    #[test]
    fn no_match() {
        assert!(!contains_lowered("FUEL STATION", "grocery"));
    }

    #[test]
    fn empty_needle_matches_everything() {
        assert!(contains_lowered("", ""));
        assert!(contains_lowered("anything", ""));
    }

    #[test]
    fn non_ascii_lowercasing() {
        assert!(contains_lowered("CAFÉ DU NORD", "café"));
        assert!(contains_lowered("ÉPICERIE", "épicerie"));
    }
}
