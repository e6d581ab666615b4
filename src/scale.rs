/// Scale Converter
///
/// Projects a 0-100 trust score onto the 1-5 Likert scale shown to users.
/// Linear: 0 -> 1.0, 25 -> 2.0, 50 -> 3.0, 75 -> 4.0, 100 -> 5.0.
pub fn to_likert(score: f64) -> f64 {
    (1.0 + (score / 100.0) * 4.0).clamp(1.0, 5.0)
}

/// Round to two decimals for the response payload. Exact halves go to the
/// even neighbour, so 20.625 -> 20.62.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_points() {
        assert_eq!(to_likert(0.0), 1.0);
        assert_eq!(to_likert(25.0), 2.0);
        assert_eq!(to_likert(50.0), 3.0);
        assert_eq!(to_likert(75.0), 4.0);
        assert_eq!(to_likert(100.0), 5.0);
    }

    #[test]
    fn test_out_of_range_clamped() {
        assert_eq!(to_likert(-40.0), 1.0);
        assert_eq!(to_likert(250.0), 5.0);
    }

    #[test]
    fn test_monotonic() {
        let mut previous = to_likert(-10.0);
        let mut score = -10.0;
        while score <= 110.0 {
            let current = to_likert(score);
            assert!(current >= previous, "not monotonic at {}", score);
            previous = current;
            score += 0.25;
        }
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(to_likert(72.0)), 3.88);
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(2.005_1), 2.01);
        assert_eq!(round2(20.625), 20.62);
        assert_eq!(round2(20.375), 20.38);
        assert_eq!(round2(-0.125), -0.12);
    }
}
