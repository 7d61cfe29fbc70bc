//! Maps user-facing ratio tokens onto the exact output sizes a model accepts.
//!
//! `negotiate` is total: any input, including garbage, yields a size from the
//! model's allow-list.

/// Output sizes accepted by the gen4 image models.
pub const GEN4_SIZES: &[&str] = &[
    "1920:1080",
    "1080:1920",
    "1024:1024",
    "1360:768",
    "1080:1080",
    "1168:880",
    "1440:1080",
    "1080:1440",
    "1808:768",
    "2112:912",
    "1280:720",
    "720:1280",
    "720:720",
    "960:720",
    "720:960",
    "1680:720",
];

/// Output sizes accepted by the gemini image model.
pub const GEMINI_SIZES: &[&str] = &[
    "1344:768",
    "768:1344",
    "1024:1024",
    "1184:864",
    "864:1184",
    "1536:672",
];

const SQUARE: &str = "1024:1024";
const LANDSCAPE: &str = "1920:1080";
const PORTRAIT: &str = "1080:1920";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Square,
    Landscape,
    Portrait,
}

/// Allow-list for a model. Anything outside the gen4 family gets the gemini grid.
pub fn allowed_sizes(model: &str) -> &'static [&'static str] {
    match model.trim() {
        "gen4_image" | "gen4_image_turbo" => GEN4_SIZES,
        _ => GEMINI_SIZES,
    }
}

/// Classify a `"W:H"` pair. `None` for anything that is not two positive integers.
pub fn orientation_of(pair: &str) -> Option<Orientation> {
    let (w, h) = pair.trim().split_once(':')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some(match w.cmp(&h) {
        std::cmp::Ordering::Equal => Orientation::Square,
        std::cmp::Ordering::Greater => Orientation::Landscape,
        std::cmp::Ordering::Less => Orientation::Portrait,
    })
}

/// Canonical size for a requested ratio, before the model allow-list is applied.
pub fn canonical_size(requested: Option<&str>) -> &'static str {
    let Some(token) = requested.map(str::trim).filter(|t| !t.is_empty()) else {
        return SQUARE;
    };
    match token.to_ascii_lowercase().as_str() {
        "1:1" | "square" => SQUARE,
        "16:9" | "landscape" => LANDSCAPE,
        "9:16" | "portrait" => PORTRAIT,
        other => match orientation_of(other) {
            Some(Orientation::Landscape) => LANDSCAPE,
            Some(Orientation::Portrait) => PORTRAIT,
            Some(Orientation::Square) | None => SQUARE,
        },
    }
}

/// Pick the concrete size to send for `requested` on `model`.
pub fn negotiate(requested: Option<&str>, model: &str) -> String {
    let allowed = allowed_sizes(model);
    let desired = canonical_size(requested);
    if allowed.contains(&desired) {
        return desired.to_string();
    }

    let class = orientation_of(desired).unwrap_or(Orientation::Square);
    allowed
        .iter()
        .find(|size| orientation_of(size) == Some(class))
        .or_else(|| allowed.first())
        .map(|size| size.to_string())
        .unwrap_or_else(|| SQUARE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODELS: &[&str] = &["gen4_image", "gen4_image_turbo", "gemini_2.5_flash", "mystery"];

    #[test]
    fn test_empty_defaults_to_square() {
        assert_eq!(negotiate(None, "gen4_image"), "1024:1024");
        assert_eq!(negotiate(Some("   "), "gemini_2.5_flash"), "1024:1024");
    }

    #[test]
    fn test_named_tokens_on_gen4() {
        assert_eq!(negotiate(Some("9:16"), "gen4_image"), "1080:1920");
        assert_eq!(negotiate(Some("portrait"), "gen4_image"), "1080:1920");
        assert_eq!(negotiate(Some("16:9"), "gen4_image"), "1920:1080");
        assert_eq!(negotiate(Some("Landscape"), "gen4_image"), "1920:1080");
        assert_eq!(negotiate(Some("1:1"), "gen4_image_turbo"), "1024:1024");
    }

    #[test]
    fn test_gemini_reclassifies() {
        assert_eq!(negotiate(Some("9:16"), "gemini_2.5_flash"), "768:1344");
        assert_eq!(negotiate(Some("16:9"), "gemini_2.5_flash"), "1344:768");
        assert_eq!(negotiate(Some("4:3"), "gemini_2.5_flash"), "1344:768");
        assert_eq!(negotiate(Some("2:3"), "gemini_2.5_flash"), "768:1344");
    }

    #[test]
    fn test_arbitrary_pairs_classified() {
        assert_eq!(canonical_size(Some("21:9")), "1920:1080");
        assert_eq!(canonical_size(Some("3:4")), "1080:1920");
        assert_eq!(canonical_size(Some("5:5")), "1024:1024");
    }

    #[test]
    fn test_malformed_degrades_to_square() {
        for token in ["abc", "16x9", ":", "0:9", "-4:3", "9:16:1"] {
            assert_eq!(canonical_size(Some(token)), "1024:1024", "token {token}");
        }
    }

    #[test]
    fn test_always_inside_allow_list() {
        let tokens = [
            "", "1:1", "16:9", "9:16", "landscape", "portrait", "square", "4:3", "3:4", "21:9",
            "1:3", "7:7", "garbage", "100000:1",
        ];
        for model in MODELS {
            let allowed = allowed_sizes(model);
            for token in tokens {
                let size = negotiate(Some(token), model);
                assert!(
                    allowed.contains(&size.as_str()),
                    "{token} on {model} gave {size}"
                );
            }
        }
    }
}
