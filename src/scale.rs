//! Tonal scale generation: white → seed → black ramps.

use std::collections::BTreeMap;

use crate::color::Rgb;

/// Conventional scale labels, lightest first.
pub const SCALE_KEYS: [u16; 10] = [50, 100, 200, 300, 400, 500, 600, 700, 800, 900];

/// Default number of steps in a scale.
pub const DEFAULT_SHADES: usize = 10;

/// Build the first `min(steps, limit)` colors of a `steps`-long ramp.
///
/// Step `i` sits at `t = i / (steps - 1)`. The first half blends white into
/// the seed, the second half blends the seed into black, so an odd `steps`
/// puts the seed exactly at the middle step.
fn ramp(seed: Rgb, steps: usize, limit: usize) -> Vec<Rgb> {
    match steps {
        0 => return Vec::new(),
        1 => return vec![seed],
        _ => {}
    }

    let last = (steps - 1) as f64;
    (0..steps.min(limit))
        .map(|i| {
            let t = i as f64 / last;
            if t <= 0.5 {
                Rgb::WHITE.mix(seed, t / 0.5)
            } else {
                seed.mix(Rgb::BLACK, (t - 0.5) / 0.5)
            }
        })
        .collect()
}

/// Generate a `steps`-long tonal scale from `seed`.
///
/// An unparseable seed is treated as black.
pub fn generate_tonal_scale(seed: &str, steps: usize) -> Vec<String> {
    ramp(Rgb::parse_or_black(seed), steps, steps)
        .into_iter()
        .map(Rgb::to_hex)
        .collect()
}

/// Generate a scale and key it by [`SCALE_KEYS`].
///
/// Only the first `min(steps, 10)` keys receive an entry. Steps beyond the
/// tenth have no key and are never computed.
pub fn scale_from_seed(seed: &str, steps: usize) -> BTreeMap<u16, String> {
    let colors = ramp(Rgb::parse_or_black(seed), steps, SCALE_KEYS.len());
    SCALE_KEYS
        .iter()
        .copied()
        .zip(colors.into_iter().map(Rgb::to_hex))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::contrast_ratio;

    #[test]
    fn test_ten_step_scale_endpoints() {
        let scale = generate_tonal_scale("#3B82F6", 10);
        assert_eq!(scale.len(), 10);
        assert_eq!(scale[0], "#FFFFFF");
        assert_eq!(scale[9], "#000000");
    }

    #[test]
    fn test_ten_step_scale_brackets_seed() {
        let scale = generate_tonal_scale("#3B82F6", 10);
        // t = 4/9 and 5/9 land just either side of the seed.
        assert!(contrast_ratio(&scale[4], "#3B82F6") < 1.2, "{}", scale[4]);
        assert!(contrast_ratio(&scale[5], "#3B82F6") < 1.3, "{}", scale[5]);
    }

    #[test]
    fn test_odd_scale_hits_seed_exactly() {
        let scale = generate_tonal_scale("#3B82F6", 9);
        assert_eq!(scale[4], "#3B82F6");
        let scale = generate_tonal_scale("#10b981", 11);
        assert_eq!(scale[5], "#10B981");
    }

    #[test]
    fn test_scale_is_monotonically_darker() {
        let scale = generate_tonal_scale("#EF4444", 10);
        let lum: Vec<f64> = scale
            .iter()
            .map(|hex| crate::color::relative_luminance(hex))
            .collect();
        assert!(lum.windows(2).all(|w| w[0] >= w[1]), "{lum:?}");
    }

    #[test]
    fn test_degenerate_step_counts() {
        assert!(generate_tonal_scale("#3B82F6", 0).is_empty());
        assert_eq!(generate_tonal_scale("#3B82F6", 1), vec!["#3B82F6"]);
        assert_eq!(generate_tonal_scale("#3B82F6", 2), vec!["#FFFFFF", "#000000"]);
    }

    #[test]
    fn test_invalid_seed_centers_on_black() {
        let scale = generate_tonal_scale("bogus", 3);
        assert_eq!(scale, vec!["#FFFFFF", "#000000", "#000000"]);
    }

    #[test]
    fn test_keyed_scale_truncates_to_available_keys() {
        let short = scale_from_seed("#3B82F6", 7);
        assert_eq!(
            short.keys().copied().collect::<Vec<_>>(),
            vec![50, 100, 200, 300, 400, 500, 600]
        );

        let long = scale_from_seed("#3B82F6", 25);
        assert_eq!(long.len(), 10);
        let full = generate_tonal_scale("#3B82F6", 25);
        assert_eq!(long[&900], full[9]);
    }
}
