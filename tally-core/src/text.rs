//! Vendor/description text normalization and fuzzy overlap scoring.

/// Known noisy OCR vendor tokens mapped to the merchant they actually mean.
/// Upstream extraction sometimes lifts a line-item word (a peripheral name,
/// a pump label) into the vendor field; these rewrites recover the intent.
const VENDOR_ALIASES: &[(&str, &str)] = &[
    ("USB", "AMAZON"),
    ("FUEL", "SHELL"),
    ("TAX", "WALMART"),
];

/// Uppercase a label and apply the OCR alias table.
pub fn normalize_label(label: &str) -> String {
    let upper = label.trim().to_uppercase();
    for (noisy, intended) in VENDOR_ALIASES {
        if upper == *noisy {
            return (*intended).to_string();
        }
    }
    upper
}

fn token_set(s: &str) -> Vec<String> {
    let mut tokens: Vec<String> = s
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_uppercase())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

/// Order- and duplicate-insensitive word-overlap ratio in [0, 1]
/// (Sørensen–Dice over unique token sets).
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta = token_set(a);
    let tb = token_set(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let common = ta.iter().filter(|t| tb.binary_search(t).is_ok()).count();
    (2.0 * common as f64) / (ta.len() + tb.len()) as f64
}

/// True when the whole vendor string appears in the description, or any
/// vendor token does. Exact containment is a strong, cheap signal that
/// should dominate partial fuzzy overlap.
pub fn label_contained(vendor: &str, description: &str) -> bool {
    if vendor.is_empty() || description.is_empty() {
        return false;
    }
    if description.contains(vendor) {
        return true;
    }
    vendor
        .split_whitespace()
        .any(|word| description.contains(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label_alias() {
        assert_eq!(normalize_label("usb"), "AMAZON");
        assert_eq!(normalize_label("Fuel"), "SHELL");
        assert_eq!(normalize_label("TAX"), "WALMART");
        assert_eq!(normalize_label("Shell Oil #421"), "SHELL OIL #421");
    }

    #[test]
    fn test_token_set_ratio_identical() {
        assert_eq!(token_set_ratio("SHELL OIL", "OIL SHELL"), 1.0);
        // Duplicates don't inflate the score
        assert_eq!(token_set_ratio("SHELL SHELL OIL", "SHELL OIL"), 1.0);
    }

    #[test]
    fn test_token_set_ratio_partial() {
        let r = token_set_ratio("SHELL OIL", "SHELL STATION");
        assert!(r > 0.0 && r < 1.0, "expected partial overlap, got {r}");
    }

    #[test]
    fn test_token_set_ratio_disjoint_or_empty() {
        assert_eq!(token_set_ratio("ALPHA", "BETA"), 0.0);
        assert_eq!(token_set_ratio("", "BETA"), 0.0);
    }

    #[test]
    fn test_label_contained() {
        assert!(label_contained("SHELL OIL #421", "SHELL OIL 0421 GAS"));
        assert!(label_contained("WALMART", "WALMART SUPERCENTER 123"));
        assert!(!label_contained("COSTCO", "TARGET STORE 55"));
        assert!(!label_contained("", "TARGET"));
    }
}
