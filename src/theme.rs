//! Series colors for chart descriptors.

/// Categorical palette, cycled by series index.
pub const SERIES_PALETTE: [&str; 10] = [
    "#3b82f6", "#ef4444", "#10b981", "#f59e0b", "#8b5cf6", "#ec4899", "#14b8a6", "#f97316",
    "#6366f1", "#84cc16",
];

pub fn series_color(index: usize) -> &'static str {
    SERIES_PALETTE[index % SERIES_PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_cycles() {
        assert_eq!(series_color(0), series_color(SERIES_PALETTE.len()));
        assert_ne!(series_color(0), series_color(1));
    }

    #[test]
    fn test_palette_entries_are_hex_colors() {
        for color in SERIES_PALETTE {
            let digits = color.trim_start_matches('#');
            assert_eq!(digits.len(), 6, "{}", color);
            assert!(hex::decode(digits).is_ok(), "{}", color);
        }
    }
}
