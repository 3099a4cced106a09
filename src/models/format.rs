// ============================================================================
// Formatage des nombres et des variations
// ============================================================================
// Les prix de cryptos couvrent des ordres de grandeur très différents
// (0.00001 à 100 000), on abrège donc avec un suffixe :
//   T (1e12), B (1e9), M (1e6), K (1e3), m (1e-3), u (1e-6)
// ============================================================================

/// Sens d'une variation, utilisé pour choisir la couleur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn of(change: f64) -> Self {
        if change > 0.0 {
            Trend::Up
        } else if change < 0.0 {
            Trend::Down
        } else {
            Trend::Flat
        }
    }
}

/// Abrège un nombre avec un suffixe d'ordre de grandeur
///
/// # Exemple
/// format_number("mc: ", 845.1e9, 1) == "mc: 845.1B"
pub fn format_number(prefix: &str, n: f64, accuracy: usize) -> String {
    let (value, suffix) = if n >= 1e12 {
        (n / 1e12, "T")
    } else if n >= 1e9 {
        (n / 1e9, "B")
    } else if n >= 1e6 {
        (n / 1e6, "M")
    } else if n >= 1e3 {
        (n / 1e3, "K")
    } else if n == 0.0 || n >= 1.0 {
        (n, "")
    } else if n < 1e-3 {
        (n * 1e6, "u")
    } else {
        (n * 1e3, "m")
    };

    format!("{}{:.*}{}", prefix, accuracy, value, suffix)
}

/// Formatte une variation : "D: 2.3"
pub fn format_change(label: &str, change: f64) -> String {
    format!("{}: {:.1}", label, change)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_suffixes() {
        assert_eq!(format_number("", 1.5e12, 2), "1.50T");
        assert_eq!(format_number("", 2.0e9, 1), "2.0B");
        assert_eq!(format_number("V: ", 3.4e6, 1), "V: 3.4M");
        assert_eq!(format_number("", 43_210.0, 2), "43.21K");
        assert_eq!(format_number("", 12.5, 2), "12.50");
        assert_eq!(format_number("", 0.5, 2), "500.00m");
        assert_eq!(format_number("", 0.00002, 2), "20.00u");
        assert_eq!(format_number("", 0.0, 2), "0.00");
    }

    #[test]
    fn test_trend() {
        assert_eq!(Trend::of(1.2), Trend::Up);
        assert_eq!(Trend::of(-0.1), Trend::Down);
        assert_eq!(Trend::of(0.0), Trend::Flat);
    }

    #[test]
    fn test_format_change() {
        assert_eq!(format_change("H", 1.234), "H: 1.2");
        assert_eq!(format_change("M", -12.0), "M: -12.0");
    }
}
