use std::borrow::Cow;

use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};

/// A screen rectangle given by two corner points, as recorded by the UI.
///
/// Corners may arrive in any order; `normalized()` produces the
/// `(left, top, width, height)` form every capture call expects.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Returns `(left, top, width, height)` with non-negative dimensions.
    pub fn normalized(&self) -> (i32, i32, u32, u32) {
        let left = self.x1.min(self.x2);
        let top = self.y1.min(self.y2);
        let width = self.x1.abs_diff(self.x2);
        let height = self.y1.abs_diff(self.y2);
        (left, top, width, height)
    }
}

/// How raw recognized text is post-processed after an `ocr` action.
///
/// Unknown mode strings are preserved in `Other` so documents written by
/// newer versions still load; extraction treats them as "no match".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrMode {
    AllText,
    Numbers,
    Email,
    Custom,
    Legacy,
    Other(String),
}

impl OcrMode {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "all_text" => Self::AllText,
            "numbers" => Self::Numbers,
            "email" => Self::Email,
            "custom" => Self::Custom,
            "legacy" => Self::Legacy,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::AllText => "all_text",
            Self::Numbers => "numbers",
            Self::Email => "email",
            Self::Custom => "custom",
            Self::Legacy => "legacy",
            Self::Other(s) => s,
        }
    }
}

/// What to do with an OCR extraction result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrProcessing {
    /// Copy the first match (or the whole string) to the clipboard.
    Copy,
    /// Alias of `Copy` kept for older documents.
    First,
    /// Report the result via the status channel only.
    Show,
    /// Copy the space-joined concatenation of all matches.
    All,
    /// Unrecognized value; reported with a marker, never an error.
    Other(String),
}

impl OcrProcessing {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "copy" => Self::Copy,
            "first" => Self::First,
            "show" => Self::Show,
            "all" => Self::All,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Copy => "copy",
            Self::First => "first",
            Self::Show => "show",
            Self::All => "all",
            Self::Other(s) => s,
        }
    }
}

/// Effective configuration of an `img_check` action.
///
/// Older documents stored a bare similarity threshold instead of an
/// object; `from_value` accepts both shapes. Serialization always emits
/// the object shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageCheckConfig {
    /// Minimum correlation score to count as a match.
    pub threshold: f64,
    /// Poll until the template is found instead of checking once.
    pub wait: bool,
    /// Seconds between polls while waiting.
    pub interval: f64,
    /// Give up waiting after this many seconds; 0 means no timeout.
    pub timeout: f64,
}

impl Default for ImageCheckConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            wait: false,
            interval: 0.5,
            timeout: 0.0,
        }
    }
}

impl ImageCheckConfig {
    /// Decode either the legacy bare-number shape or the object shape.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        if let Some(threshold) = value.as_f64() {
            return Ok(Self {
                threshold,
                ..Self::default()
            });
        }
        let Some(map) = value.as_object() else {
            return Err(format!("img_check config must be a number or object, got {value}"));
        };
        let defaults = Self::default();
        Ok(Self {
            threshold: map
                .get("threshold")
                .and_then(Value::as_f64)
                .unwrap_or(defaults.threshold),
            wait: map.get("wait").and_then(Value::as_bool).unwrap_or(defaults.wait),
            interval: map
                .get("interval")
                .and_then(Value::as_f64)
                .unwrap_or(defaults.interval),
            timeout: map
                .get("timeout")
                .and_then(Value::as_f64)
                .unwrap_or(defaults.timeout),
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "threshold": self.threshold,
            "wait": self.wait,
            "interval": self.interval,
            "timeout": self.timeout,
        })
    }
}

/// One recordable macro step.
///
/// The persisted form is the legacy flat JSON array whose first element
/// is the tag (e.g. `["click", 10, 20]`, `["hotkey", "ctrl", "a"]`), so
/// documents saved by older releases keep loading unchanged. The manual
/// serde impls below own that mapping; nothing else in the crate touches
/// the array shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Left click at an absolute screen coordinate.
    Click { x: i32, y: i32 },
    /// Press at `start`, move to `end`, release.
    Drag { start: (i32, i32), end: (i32, i32) },
    /// Pause playback for a number of seconds.
    Delay { seconds: f64 },
    /// Send the clipboard-copy hotkey.
    Copy,
    /// Send the clipboard-paste hotkey.
    Paste,
    /// Per-loop-iteration paste source; ties the loop count to the
    /// shortest list present in the document.
    PasteList { items: Vec<String> },
    /// Simultaneous key combination.
    Hotkey { keys: Vec<String> },
    /// Press one key `count` times, `interval` seconds apart.
    Key {
        name: String,
        count: u32,
        interval: f64,
    },
    /// Block playback until a key is pressed. Not executable in
    /// unattended playback; the runner skips it with a status message.
    WaitKey { name: String },
    /// Capture a region, recognize text, extract and act on the result.
    Ocr {
        region: Region,
        mode: OcrMode,
        pattern: String,
        processing: OcrProcessing,
    },
    /// Conditional branch on a template match within a region.
    ImgCheck {
        image_path: String,
        region: Region,
        sub_actions: Vec<Action>,
        config: ImageCheckConfig,
    },
    /// Click the center of the most recent match. Only valid inside
    /// `ImgCheck::sub_actions`.
    ClickFound,
    /// Action with a tag this release does not know, preserved verbatim
    /// so documents from newer recorders still load and round-trip.
    /// Playback skips it with a status message.
    Unknown { raw: Vec<Value> },
}

impl Action {
    /// Tag string used in the persisted array form.
    pub fn tag(&self) -> &str {
        match self {
            Self::Click { .. } => "click",
            Self::Drag { .. } => "drag",
            Self::Delay { .. } => "delay",
            Self::Copy => "copy",
            Self::Paste => "paste",
            Self::PasteList { .. } => "paste_list",
            Self::Hotkey { .. } => "hotkey",
            Self::Key { .. } => "key",
            Self::WaitKey { .. } => "wait_key",
            Self::Ocr { .. } => "ocr",
            Self::ImgCheck { .. } => "img_check",
            Self::ClickFound => "click_found",
            Self::Unknown { raw } => raw.first().and_then(Value::as_str).unwrap_or("unknown"),
        }
    }

    /// Convert to the persisted flat-array JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Click { x, y } => json!(["click", x, y]),
            Self::Drag { start, end } => {
                json!(["drag", [start.0, start.1], [end.0, end.1]])
            }
            Self::Delay { seconds } => json!(["delay", seconds]),
            Self::Copy => json!(["copy"]),
            Self::Paste => json!(["paste"]),
            Self::PasteList { items } => json!(["paste_list", items]),
            Self::Hotkey { keys } => {
                let mut arr = vec![Value::from("hotkey")];
                arr.extend(keys.iter().map(|k| Value::from(k.as_str())));
                Value::Array(arr)
            }
            Self::Key {
                name,
                count,
                interval,
            } => json!(["key", name, count, interval]),
            Self::WaitKey { name } => json!(["wait_key", name]),
            Self::Ocr {
                region,
                mode,
                pattern,
                processing,
            } => json!([
                "ocr",
                [region.x1, region.y1, region.x2, region.y2],
                mode.as_str(),
                pattern,
                processing.as_str(),
            ]),
            Self::ImgCheck {
                image_path,
                region,
                sub_actions,
                config,
            } => {
                let subs: Vec<Value> = sub_actions.iter().map(Action::to_value).collect();
                json!([
                    "img_check",
                    image_path,
                    [region.x1, region.y1, region.x2, region.y2],
                    subs,
                    config.to_value(),
                ])
            }
            Self::ClickFound => json!(["click_found"]),
            Self::Unknown { raw } => Value::Array(raw.clone()),
        }
    }

    /// Decode the persisted flat-array JSON value.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let arr = value
            .as_array()
            .ok_or_else(|| format!("action must be an array, got {value}"))?;
        let tag = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| format!("action array must start with a string tag: {value}"))?;

        match tag {
            "click" => Ok(Self::Click {
                x: int_field(arr, 1, "click x")?,
                y: int_field(arr, 2, "click y")?,
            }),
            "drag" => Ok(Self::Drag {
                start: point_field(arr, 1, "drag start")?,
                end: point_field(arr, 2, "drag end")?,
            }),
            "delay" => Ok(Self::Delay {
                seconds: float_field(arr, 1, "delay seconds")?,
            }),
            "copy" => Ok(Self::Copy),
            "paste" => Ok(Self::Paste),
            "paste_list" => {
                let items = arr
                    .get(1)
                    .and_then(Value::as_array)
                    .ok_or_else(|| "paste_list requires a list of strings".to_string())?
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| format!("paste_list item must be a string: {v}"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::PasteList { items })
            }
            "hotkey" => {
                let keys = arr[1..]
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| format!("hotkey key must be a string: {v}"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Hotkey { keys })
            }
            "key" => Ok(Self::Key {
                name: str_field(arr, 1, "key name")?,
                count: int_field(arr, 2, "key count")?.max(1) as u32,
                interval: float_field(arr, 3, "key interval")?.max(0.0),
            }),
            "wait_key" => Ok(Self::WaitKey {
                name: str_field(arr, 1, "wait_key name")?,
            }),
            "ocr" => {
                let region = region_field(arr, 1, "ocr region")?;
                // Older recordings stored only the region; they imply
                // legacy extraction copied to the clipboard.
                if arr.len() >= 5 {
                    Ok(Self::Ocr {
                        region,
                        mode: OcrMode::from_tag(&str_field(arr, 2, "ocr mode")?),
                        pattern: str_field(arr, 3, "ocr pattern")?,
                        processing: OcrProcessing::from_tag(&str_field(arr, 4, "ocr processing")?),
                    })
                } else {
                    Ok(Self::Ocr {
                        region,
                        mode: OcrMode::Legacy,
                        pattern: String::new(),
                        processing: OcrProcessing::Copy,
                    })
                }
            }
            "img_check" => {
                if arr.len() < 5 {
                    return Err(format!("img_check requires 5 fields, got {}", arr.len()));
                }
                let sub_actions = arr[3]
                    .as_array()
                    .ok_or_else(|| "img_check sub-actions must be an array".to_string())?
                    .iter()
                    .map(Action::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::ImgCheck {
                    image_path: str_field(arr, 1, "img_check image path")?,
                    region: region_field(arr, 2, "img_check region")?,
                    sub_actions,
                    config: ImageCheckConfig::from_value(&arr[4])?,
                })
            }
            "click_found" => Ok(Self::ClickFound),
            // Unknown tags stay loadable; the runner skips them.
            _ => Ok(Self::Unknown { raw: arr.clone() }),
        }
    }
}

fn int_field(arr: &[Value], idx: usize, what: &str) -> Result<i32, String> {
    let v = arr
        .get(idx)
        .ok_or_else(|| format!("missing field: {what}"))?;
    v.as_i64()
        .or_else(|| v.as_f64().map(|f| f as i64))
        .map(|n| n as i32)
        .ok_or_else(|| format!("{what} must be a number, got {v}"))
}

fn float_field(arr: &[Value], idx: usize, what: &str) -> Result<f64, String> {
    let v = arr
        .get(idx)
        .ok_or_else(|| format!("missing field: {what}"))?;
    v.as_f64()
        .ok_or_else(|| format!("{what} must be a number, got {v}"))
}

fn str_field(arr: &[Value], idx: usize, what: &str) -> Result<String, String> {
    arr.get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("{what} must be a string"))
}

fn point_field(arr: &[Value], idx: usize, what: &str) -> Result<(i32, i32), String> {
    let pair = arr
        .get(idx)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("{what} must be an [x, y] pair"))?;
    if pair.len() != 2 {
        return Err(format!("{what} must have exactly two coordinates"));
    }
    Ok((
        int_field(pair, 0, what)?,
        int_field(pair, 1, what)?,
    ))
}

fn region_field(arr: &[Value], idx: usize, what: &str) -> Result<Region, String> {
    let quad = arr
        .get(idx)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("{what} must be an [x1, y1, x2, y2] array"))?;
    if quad.len() != 4 {
        return Err(format!("{what} must have exactly four coordinates"));
    }
    Ok(Region::new(
        int_field(quad, 0, what)?,
        int_field(quad, 1, what)?,
        int_field(quad, 2, what)?,
        int_field(quad, 3, what)?,
    ))
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Action::from_value(&value).map_err(D::Error::custom)
    }
}

impl JsonSchema for Action {
    fn schema_name() -> Cow<'static, str> {
        "Action".into()
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "array",
            "description": "Flat action array: first element is the string tag \
                            (click, drag, delay, copy, paste, paste_list, hotkey, \
                            key, wait_key, ocr, img_check, click_found), remaining \
                            elements are tag-specific fields.",
            "items": true,
            "minItems": 1,
        })
    }
}

fn default_loop_count() -> u32 {
    1
}

fn default_auto_delay_time() -> f64 {
    0.5
}

/// The persisted macro document.
///
/// The runner only ever sees `actions` and `loop_count`; the auto-delay
/// fields belong to the recording layer and are carried for fidelity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct MacroDocument {
    /// Ordered list of recorded actions.
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Number of times to replay the whole list (>= 1).
    #[serde(default = "default_loop_count")]
    pub loop_count: u32,

    /// Whether the recorder inserted automatic delays between steps.
    #[serde(default)]
    pub auto_delay: bool,

    /// Delay the recorder inserted when `auto_delay` was on, in seconds.
    #[serde(default = "default_auto_delay_time", rename = "auto_delay_time")]
    pub auto_delay_time: f64,
}
