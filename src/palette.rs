//! Palette engine: semantic tokens, accessibility metadata, CSS rendering.
//!
//! These structs are the wire shape of a `generatePalette` result. Field names
//! follow the JSON protocol (`cssVars`, `includeAccessibility`, `AA`/`AAA`).

use std::collections::BTreeMap;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::color::contrast_ratio;
use crate::scale::{scale_from_seed, DEFAULT_SHADES};

/// Default shade key for every token.
const DEFAULT_SHADE_KEY: &str = "500";

/// Default theme name.
const DEFAULT_THEME: &str = "default";

/// WCAG thresholds for normal-size text.
const WCAG_AA: f64 = 4.5;
const WCAG_AAA: f64 = 7.0;

/// Tokens seeded from user input, in seed order, with their fallbacks.
const USER_TOKENS: [(&str, &str); 3] = [
    ("primary", "#3B82F6"),
    ("secondary", "#6B7280"),
    ("accent", "#EF4444"),
];

/// Tokens that always use fixed seeds.
const FIXED_TOKENS: [(&str, &str); 4] = [
    ("success", "#10B981"),
    ("warning", "#F59E0B"),
    ("danger", "#DC2626"),
    ("neutral", "#F3F4F6"),
];

/// One seed color or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Seed {
    One(String),
    Many(Vec<String>),
}

impl Seed {
    /// Seeds in order. An empty single seed counts as no seed.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Seed::One(s) if s.is_empty() => Vec::new(),
            Seed::One(s) => vec![s.clone()],
            Seed::Many(v) => v.clone(),
        }
    }
}

/// Params the engine cannot use at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("seed must be a color string, got {0}")]
    InvalidSeed(String),
}

/// Options for [`generate_palette`]. Every field is optional.
///
/// Deserializing goes through [`GenerateParams::from_json`], which tolerates
/// loosely typed input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<Seed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shades: Option<usize>,
    /// Accepted and echoed back; does not change the generated colors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dark: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_accessibility: Option<bool>,
}

impl GenerateParams {
    /// Decode request params.
    ///
    /// A field of the wrong type falls back to its default, and the two flags
    /// follow JSON truthiness. Non-object params mean all defaults. Only a
    /// truthy seed that is not a string, or a list whose used entries are not
    /// strings or `null`, is rejected.
    pub fn from_json(params: &Value) -> Result<Self, ParamsError> {
        Ok(Self {
            theme: field(params, "theme")
                .and_then(Value::as_str)
                .map(str::to_string),
            seed: field(params, "seed").map(decode_seed).transpose()?.flatten(),
            shades: field(params, "shades").and_then(decode_shades),
            dark: field(params, "dark").map(is_truthy),
            include_accessibility: field(params, "includeAccessibility").map(is_truthy),
        })
    }
}

impl<'de> Deserialize<'de> for GenerateParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(de::Error::custom)
    }
}

/// A present, non-null field of an object.
fn field<'a>(params: &'a Value, name: &str) -> Option<&'a Value> {
    params.get(name).filter(|v| !v.is_null())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn decode_shades(value: &Value) -> Option<usize> {
    if let Some(n) = value.as_u64() {
        return Some(usize::try_from(n).unwrap_or(usize::MAX));
    }
    match value.as_f64() {
        // A negative count yields empty scales.
        Some(n) if n < 0.0 => Some(0),
        Some(n) if n.fract() == 0.0 => Some(n as usize),
        _ => {
            debug!("Ignoring shades {}; using the default", value);
            None
        }
    }
}

/// Only the entries that seed user tokens are looked at; a `null` entry keeps
/// that token's fallback.
fn decode_seed(value: &Value) -> Result<Option<Seed>, ParamsError> {
    match value {
        Value::String(s) => Ok(Some(Seed::One(s.clone()))),
        Value::Array(items) => items
            .iter()
            .zip(USER_TOKENS)
            .map(|(item, (_, fallback))| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Null => Ok(fallback.to_string()),
                other => Err(ParamsError::InvalidSeed(other.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|seeds| Some(Seed::Many(seeds))),
        other if !is_truthy(other) => Ok(None),
        other => Err(ParamsError::InvalidSeed(other.to_string())),
    }
}

/// WCAG pass flags for a shade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wcag {
    #[serde(rename = "AA")]
    pub aa: bool,
    #[serde(rename = "AAA")]
    pub aaa: bool,
}

/// A single scale entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shade {
    pub hex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wcag: Option<Wcag>,
}

impl Shade {
    pub fn new(hex: String) -> Self {
        Self {
            hex,
            contrast: None,
            wcag: None,
        }
    }

    /// Attach contrast against the better of white or black, plus WCAG flags.
    fn annotate(&mut self) {
        let on_white = contrast_ratio(&self.hex, "#FFFFFF");
        let on_black = contrast_ratio(&self.hex, "#000000");
        let contrast = on_white.max(on_black);
        self.contrast = Some(contrast);
        self.wcag = Some(Wcag {
            aa: contrast >= WCAG_AA,
            aaa: contrast >= WCAG_AAA,
        });
    }
}

/// A semantic color role and its tonal scale.
///
/// `shades` is keyed by scale label (`50`..`900`) and serializes in
/// ascending key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub default: String,
    pub shades: BTreeMap<u16, Shade>,
}

impl Token {
    fn from_seed(name: &str, seed: &str, steps: usize) -> Self {
        let shades = scale_from_seed(seed, steps)
            .into_iter()
            .map(|(key, hex)| (key, Shade::new(hex)))
            .collect();
        Self {
            token: name.to_string(),
            default: DEFAULT_SHADE_KEY.to_string(),
            shades,
        }
    }
}

/// Structured rendering: the token list alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokensJson {
    pub tokens: Vec<Token>,
}

/// The two renderings of a palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formats {
    #[serde(rename = "cssVars")]
    pub css_vars: String,
    pub json: TokensJson,
}

/// A generated palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteResult {
    pub theme: String,
    pub dark: bool,
    pub tokens: Vec<Token>,
    pub formats: Formats,
}

impl PaletteResult {
    /// Look up a token by name.
    pub fn token(&self, name: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.token == name)
    }
}

/// Render tokens as CSS custom properties inside one `:root` block.
///
/// One `--<token>-<key>: <hex>;` line per shade, token-then-key order.
pub fn render_css_vars(tokens: &[Token]) -> String {
    let lines: Vec<String> = tokens
        .iter()
        .flat_map(|t| {
            t.shades
                .iter()
                .map(move |(key, shade)| format!("--{}-{}: {};", t.token, key, shade.hex))
        })
        .collect();

    format!(":root {{\n  {}\n}}", lines.join("\n  "))
}

/// Generate a palette. Never fails; malformed seeds degrade to black ramps.
pub fn generate_palette(params: &GenerateParams) -> PaletteResult {
    let steps = params.shades.unwrap_or(DEFAULT_SHADES);
    let seeds = params.seed.as_ref().map(Seed::to_vec).unwrap_or_default();

    let mut tokens: Vec<Token> = USER_TOKENS
        .iter()
        .enumerate()
        .map(|(i, (name, fallback))| {
            let seed = seeds.get(i).map(String::as_str).unwrap_or(*fallback);
            Token::from_seed(name, seed, steps)
        })
        .chain(
            FIXED_TOKENS
                .iter()
                .map(|(name, seed)| Token::from_seed(name, seed, steps)),
        )
        .collect();

    if params.include_accessibility.unwrap_or(false) {
        tokens
            .iter_mut()
            .flat_map(|t| t.shades.values_mut())
            .for_each(Shade::annotate);
    }

    let css_vars = render_css_vars(&tokens);
    let theme = params
        .theme
        .clone()
        .unwrap_or_else(|| DEFAULT_THEME.to_string());

    debug!(
        "Generated palette theme={} tokens={} steps={}",
        theme,
        tokens.len(),
        steps
    );

    PaletteResult {
        theme,
        dark: params.dark.unwrap_or(false),
        formats: Formats {
            css_vars,
            json: TokensJson {
                tokens: tokens.clone(),
            },
        },
        tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let palette = generate_palette(&GenerateParams::default());
        assert_eq!(palette.theme, "default");
        assert!(!palette.dark);

        let names: Vec<&str> = palette.tokens.iter().map(|t| t.token.as_str()).collect();
        assert_eq!(
            names,
            vec!["primary", "secondary", "accent", "success", "warning", "danger", "neutral"]
        );
        for token in &palette.tokens {
            assert_eq!(token.default, "500");
            assert_eq!(token.shades.len(), 10);
            assert!(token.shades.values().all(|s| s.contrast.is_none() && s.wcag.is_none()));
        }
    }

    #[test]
    fn test_user_seeds_map_to_first_three_tokens() {
        let params = GenerateParams {
            seed: Some(Seed::Many(vec!["#111".into(), "#222".into()])),
            shades: Some(3),
            ..Default::default()
        };
        let palette = generate_palette(&params);

        assert_eq!(palette.token("primary").unwrap().shades[&100].hex, "#111111");
        assert_eq!(palette.token("secondary").unwrap().shades[&100].hex, "#222222");
        // Unsupplied accent falls back, fixed tokens ignore user seeds.
        assert_eq!(palette.token("accent").unwrap().shades[&100].hex, "#EF4444");
        assert_eq!(palette.token("success").unwrap().shades[&100].hex, "#10B981");
    }

    #[test]
    fn test_single_string_seed() {
        let params: GenerateParams =
            serde_json::from_value(json!({"seed": "#0F0", "shades": 5})).unwrap();
        let palette = generate_palette(&params);
        assert_eq!(palette.token("primary").unwrap().shades[&200].hex, "#00FF00");
    }

    #[test]
    fn test_accessibility_metadata() {
        let params = GenerateParams {
            seed: Some(Seed::One("#3B82F6".into())),
            shades: Some(10),
            include_accessibility: Some(true),
            ..Default::default()
        };
        let palette = generate_palette(&params);

        for token in &palette.tokens {
            for shade in token.shades.values() {
                let contrast = shade.contrast.expect("contrast present");
                let wcag = shade.wcag.expect("wcag present");
                assert!(contrast >= 1.0);
                assert_eq!(wcag.aa, contrast >= 4.5);
                assert_eq!(wcag.aaa, contrast >= 7.0);
            }
        }

        let primary = palette.token("primary").unwrap();
        assert_eq!(primary.shades[&50].contrast, Some(21.0));
        assert_eq!(primary.shades[&900].contrast, Some(21.0));
    }

    #[test]
    fn test_css_vars_rendering() {
        let params = GenerateParams {
            shades: Some(2),
            ..Default::default()
        };
        let palette = generate_palette(&params);
        let css = &palette.formats.css_vars;

        assert!(css.starts_with(":root {\n  --primary-50: #FFFFFF;\n  --primary-100: #000000;"));
        assert!(css.ends_with("--neutral-100: #000000;\n}"));
        assert_eq!(css.lines().count(), 7 * 2 + 2);
    }

    #[test]
    fn test_json_shape() {
        let params = GenerateParams {
            theme: Some("calm".into()),
            dark: Some(true),
            shades: Some(2),
            include_accessibility: Some(true),
            ..Default::default()
        };
        let value = serde_json::to_value(generate_palette(&params)).unwrap();

        assert_eq!(value["theme"], "calm");
        assert_eq!(value["dark"], true);
        assert_eq!(value["tokens"][0]["shades"]["50"]["hex"], "#FFFFFF");
        assert_eq!(value["tokens"][0]["shades"]["50"]["wcag"]["AAA"], true);
        assert!(value["formats"]["cssVars"].is_string());
        assert_eq!(value["formats"]["json"]["tokens"], value["tokens"]);
    }

    #[test]
    fn test_shade_keys_serialize_in_scale_order() {
        let palette = generate_palette(&GenerateParams::default());
        let text = serde_json::to_string(&palette.tokens[0]).unwrap();
        let p50 = text.find("\"50\"").unwrap();
        let p100 = text.find("\"100\"").unwrap();
        let p900 = text.find("\"900\"").unwrap();
        assert!(p50 < p100 && p100 < p900);
    }

    #[test]
    fn test_dark_flag_does_not_change_colors() {
        let light = generate_palette(&GenerateParams::default());
        let dark = generate_palette(&GenerateParams {
            dark: Some(true),
            ..Default::default()
        });
        assert_eq!(light.tokens, dark.tokens);
        assert!(dark.dark);
    }

    #[test]
    fn test_params_fall_back_on_wrong_types() {
        let params = GenerateParams::from_json(&json!({
            "theme": 5,
            "shades": "many",
            "dark": "yes",
            "includeAccessibility": 1
        }))
        .unwrap();
        assert_eq!(
            params,
            GenerateParams {
                dark: Some(true),
                include_accessibility: Some(true),
                ..Default::default()
            }
        );

        let params = GenerateParams::from_json(&json!({"includeAccessibility": 0, "shades": 4.0}))
            .unwrap();
        assert_eq!(params.include_accessibility, Some(false));
        assert_eq!(params.shades, Some(4));
    }

    #[test]
    fn test_negative_shades_make_empty_scales() {
        let params = GenerateParams::from_json(&json!({"shades": -1})).unwrap();
        assert_eq!(params.shades, Some(0));
        assert!(generate_palette(&params).tokens.iter().all(|t| t.shades.is_empty()));
    }

    #[test]
    fn test_non_object_params_mean_defaults() {
        for params in [json!(42), json!("x"), json!([1, 2]), json!(null)] {
            assert_eq!(GenerateParams::from_json(&params).unwrap(), GenerateParams::default());
        }
    }

    #[test]
    fn test_seed_decoding() {
        let params = GenerateParams::from_json(&json!({"seed": [null, "#222"]})).unwrap();
        assert_eq!(params.seed, Some(Seed::Many(vec!["#3B82F6".into(), "#222".into()])));

        // Falsy seeds mean no seed; entries past the user tokens are unused.
        for seed in [json!(""), json!(false), json!(0)] {
            assert_eq!(GenerateParams::from_json(&json!({"seed": seed})).unwrap().seed, None);
        }
        let params = GenerateParams::from_json(&json!({"seed": ["#1", "#2", "#3", 4]})).unwrap();
        assert_eq!(params.seed.unwrap().to_vec().len(), 3);
    }

    #[test]
    fn test_unusable_seed_is_rejected() {
        assert_eq!(
            GenerateParams::from_json(&json!({"seed": 42})),
            Err(ParamsError::InvalidSeed("42".into()))
        );
        assert_eq!(
            GenerateParams::from_json(&json!({"seed": ["#111", {"hex": "#222"}]})),
            Err(ParamsError::InvalidSeed(r##"{"hex":"#222"}"##.into()))
        );
        assert!(serde_json::from_value::<GenerateParams>(json!({"seed": true})).is_err());
    }

    #[test]
    fn test_empty_seed_string_uses_defaults() {
        let params = GenerateParams {
            seed: Some(Seed::One(String::new())),
            ..Default::default()
        };
        assert_eq!(
            generate_palette(&params).tokens,
            generate_palette(&GenerateParams::default()).tokens
        );
    }
}
