//! Process label colors.
//!
//! Every entry gets one color from a small palette when the registry is built. Colors
//! are handed out so usage counts stay balanced; a color pinned in the config is
//! honored even if that unbalances the counts.

use crossterm::style::Color;

use crate::process::ProcessStatus;

/// Colors available for process labels, in allocation order.
pub const PALETTE: [(&str, Color); 5] = [
    ("cyan", Color::Cyan),
    ("magenta", Color::Magenta),
    ("blue", Color::Blue),
    ("yellow", Color::Yellow),
    ("green", Color::Green),
];

/// Looks up a palette color by name (case-insensitive).
pub fn palette_index(name: &str) -> Option<usize> {
    let name = name.trim().to_lowercase();
    PALETTE.iter().position(|(candidate, _)| *candidate == name)
}

/// Balances palette usage across entries.
#[derive(Debug, Default, Clone)]
pub struct ColorAllocator {
    counts: [usize; PALETTE.len()],
}

impl ColorAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks the color for a new entry.
    ///
    /// A pinned palette name wins; otherwise the least used color, earliest in the
    /// palette on ties. A pin that names no palette color is handed back as the
    /// second element so the caller can report it.
    pub fn assign(&mut self, pinned: Option<&str>) -> (Color, Option<String>) {
        let mut rejected = None;
        let index = match pinned.map(|name| (name, palette_index(name))) {
            Some((_, Some(index))) => index,
            Some((name, None)) => {
                rejected = Some(name.to_string());
                self.least_used()
            }
            None => self.least_used(),
        };
        self.counts[index] += 1;
        (PALETTE[index].1, rejected)
    }

    fn least_used(&self) -> usize {
        let mut best = 0;
        for (index, count) in self.counts.iter().enumerate() {
            if *count < self.counts[best] {
                best = index;
            }
        }
        best
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }
}

/// Color (and boldness) used for a status bullet and word.
pub fn status_style(status: ProcessStatus) -> (Color, bool) {
    match status {
        ProcessStatus::Running => (Color::Green, false),
        ProcessStatus::Failed => (Color::Red, true),
        ProcessStatus::Stopped => (Color::Red, false),
        ProcessStatus::Completed => (Color::Yellow, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpinned_colors_follow_palette_order() {
        let mut colors = ColorAllocator::new();
        let assigned = (0..5).map(|_| colors.assign(None).0).collect::<Vec<_>>();
        let expected = PALETTE.iter().map(|(_, color)| *color).collect::<Vec<_>>();
        assert_eq!(assigned, expected);
    }

    #[test]
    fn counts_stay_within_one() {
        for n in 0..23 {
            let mut colors = ColorAllocator::new();
            for _ in 0..n {
                colors.assign(None);
            }
            let max = *colors.counts().iter().max().unwrap();
            let min = *colors.counts().iter().min().unwrap();
            assert!(max - min <= 1, "n = {}: {:?}", n, colors.counts());
            assert_eq!(colors.counts().iter().sum::<usize>(), n);
        }
    }

    #[test]
    fn pinned_color_counts_toward_balance() {
        let mut colors = ColorAllocator::new();
        assert_eq!(colors.assign(Some("Cyan")).0, Color::Cyan);
        // cyan is taken, so the next free color is magenta
        assert_eq!(colors.assign(None).0, Color::Magenta);
        assert_eq!(colors.assign(Some("cyan")).0, Color::Cyan);
        assert_eq!(colors.counts()[0], 2);
    }

    #[test]
    fn unknown_pin_falls_back_and_is_reported() {
        let mut colors = ColorAllocator::new();
        let (color, rejected) = colors.assign(Some("chartreuse"));
        assert_eq!(color, Color::Cyan);
        assert_eq!(rejected.as_deref(), Some("chartreuse"));
    }

    #[test]
    fn failed_is_bold_red() {
        assert_eq!(status_style(ProcessStatus::Failed), (Color::Red, true));
        assert_eq!(status_style(ProcessStatus::Stopped), (Color::Red, false));
    }
}
