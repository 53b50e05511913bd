//! Typed attribute values and their layer-XML encodings.

use crate::xml::escape::{first_invalid_char, is_xml_char};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute value carried by a file or folder
///
/// `Method`, `New`, `Bundle` and `Serial` are kept as literal strings and are
/// never evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    String(String),
    Url(String),
    Method(String),
    New(String),
    Bundle(String),
    Serial(String),
}

/// XML attribute names that carry a value inside `<attr>`
pub const VALUE_KINDS: &[&str] = &[
    "boolvalue",
    "bytevalue",
    "shortvalue",
    "intvalue",
    "longvalue",
    "floatvalue",
    "doublevalue",
    "charvalue",
    "stringvalue",
    "urlvalue",
    "methodvalue",
    "newvalue",
    "bundlevalue",
    "serialvalue",
];

impl AttrValue {
    /// Name of the XML attribute this value is written under
    pub fn xml_kind(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "boolvalue",
            AttrValue::Byte(_) => "bytevalue",
            AttrValue::Short(_) => "shortvalue",
            AttrValue::Int(_) => "intvalue",
            AttrValue::Long(_) => "longvalue",
            AttrValue::Float(_) => "floatvalue",
            AttrValue::Double(_) => "doublevalue",
            AttrValue::Char(_) => "charvalue",
            AttrValue::String(_) => "stringvalue",
            AttrValue::Url(_) => "urlvalue",
            AttrValue::Method(_) => "methodvalue",
            AttrValue::New(_) => "newvalue",
            AttrValue::Bundle(_) => "bundlevalue",
            AttrValue::Serial(_) => "serialvalue",
        }
    }

    /// Value text as it appears in the document, before XML escaping
    pub fn encode(&self) -> String {
        match self {
            AttrValue::Bool(v) => v.to_string(),
            AttrValue::Byte(v) => v.to_string(),
            AttrValue::Short(v) => v.to_string(),
            AttrValue::Int(v) => v.to_string(),
            AttrValue::Long(v) => v.to_string(),
            AttrValue::Float(v) => v.to_string(),
            AttrValue::Double(v) => v.to_string(),
            AttrValue::Char(v) => v.to_string(),
            AttrValue::String(v) => encode_string(v),
            AttrValue::Url(v)
            | AttrValue::Method(v)
            | AttrValue::New(v)
            | AttrValue::Bundle(v)
            | AttrValue::Serial(v) => v.clone(),
        }
    }

    /// Check that the value can be written to a layer document. Only
    /// `stringvalue` escapes its text; every other kind is written as is.
    pub fn validate(&self) -> Result<(), String> {
        let literal = match self {
            AttrValue::Char(c) => {
                if is_xml_char(*c) {
                    return Ok(());
                }
                return Err(format!("character {:?} cannot be stored in XML", c));
            }
            AttrValue::Url(v)
            | AttrValue::Method(v)
            | AttrValue::New(v)
            | AttrValue::Bundle(v)
            | AttrValue::Serial(v) => v,
            _ => return Ok(()),
        };
        match first_invalid_char(literal) {
            Some(c) => Err(format!(
                "{} contains {:?}, which cannot be stored in XML",
                self.xml_kind(),
                c
            )),
            None => Ok(()),
        }
    }

    /// Parse a value written under `kind`. Returns `Ok(None)` for an
    /// unrecognized kind.
    pub fn decode(kind: &str, raw: &str) -> Result<Option<AttrValue>, String> {
        let value = match kind {
            "boolvalue" => match raw.to_ascii_lowercase().as_str() {
                "true" => AttrValue::Bool(true),
                "false" => AttrValue::Bool(false),
                _ => return Err(format!("invalid boolean {:?}", raw)),
            },
            "bytevalue" => AttrValue::Byte(parse_number(kind, raw)?),
            "shortvalue" => AttrValue::Short(parse_number(kind, raw)?),
            "intvalue" => AttrValue::Int(parse_number(kind, raw)?),
            "longvalue" => AttrValue::Long(parse_number(kind, raw)?),
            "floatvalue" => AttrValue::Float(parse_number(kind, raw)?),
            "doublevalue" => AttrValue::Double(parse_number(kind, raw)?),
            "charvalue" => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => AttrValue::Char(c),
                    _ => return Err(format!("charvalue must be one character, got {:?}", raw)),
                }
            }
            "stringvalue" => AttrValue::String(decode_string(raw)),
            "urlvalue" => AttrValue::Url(raw.to_string()),
            "methodvalue" => AttrValue::Method(raw.to_string()),
            "newvalue" => AttrValue::New(raw.to_string()),
            "bundlevalue" => AttrValue::Bundle(raw.to_string()),
            "serialvalue" => AttrValue::Serial(raw.to_string()),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Parse a value from a short type name (`bool`, `int`, `string`, ...)
    /// as accepted on the command line.
    pub fn parse_typed(type_name: &str, raw: &str) -> Result<AttrValue, String> {
        let kind = match type_name {
            "bool" | "boolean" => "boolvalue",
            "byte" => "bytevalue",
            "short" => "shortvalue",
            "int" => "intvalue",
            "long" => "longvalue",
            "float" => "floatvalue",
            "double" => "doublevalue",
            "char" => "charvalue",
            "string" => return Ok(AttrValue::String(raw.to_string())),
            "url" => "urlvalue",
            "method" => "methodvalue",
            "new" => "newvalue",
            "bundle" => "bundlevalue",
            "serial" => "serialvalue",
            other => return Err(format!("unknown attribute type {:?}", other)),
        };
        AttrValue::decode(kind, raw)?.ok_or_else(|| format!("unknown attribute type {:?}", type_name))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(v)
            | AttrValue::Url(v)
            | AttrValue::Method(v)
            | AttrValue::New(v)
            | AttrValue::Bundle(v)
            | AttrValue::Serial(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(v) => write!(f, "{}", v),
            AttrValue::Method(v) => write!(f, "method:{}", v),
            AttrValue::New(v) => write!(f, "new:{}", v),
            AttrValue::Bundle(v) => write!(f, "bundle:{}", v),
            AttrValue::Serial(v) => write!(f, "serial:{}", v),
            other => write!(f, "{}", other.encode()),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::String(v)
    }
}

fn parse_number<T: std::str::FromStr>(kind: &str, raw: &str) -> Result<T, String>
where
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| format!("invalid {} {:?}: {}", kind, raw, e))
}

fn needs_escape(c: char) -> bool {
    c.is_control() || !is_xml_char(c) || matches!(c, '&' | '<' | '>' | '"' | '\'')
}

/// Encode a string value: control and markup characters become `\uXXXX`,
/// as does a backslash that would otherwise read back as an escape.
fn encode_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        let literal_escape = c == '\\' && chars.peek() == Some(&'u');
        if needs_escape(c) || literal_escape {
            out.push_str(&format!("\\u{:04X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode `\uXXXX` escapes, combining UTF-16 surrogate pairs. Malformed
/// escapes are kept as literal text.
fn decode_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find("\\u") {
        out.push_str(&rest[..idx]);
        let after = &rest[idx..];
        match read_escape(after) {
            Some((unit, consumed)) if (0xD800..0xDC00).contains(&unit) => {
                let tail = &after[consumed..];
                match read_escape(tail) {
                    Some((low, consumed_low)) if (0xDC00..0xE000).contains(&low) => {
                        let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                        match char::from_u32(code) {
                            Some(c) => out.push(c),
                            None => out.push_str(&after[..consumed + consumed_low]),
                        }
                        rest = &after[consumed + consumed_low..];
                    }
                    _ => {
                        out.push_str(&after[..consumed]);
                        rest = tail;
                    }
                }
            }
            Some((unit, consumed)) => {
                match char::from_u32(unit) {
                    Some(c) => out.push(c),
                    None => out.push_str(&after[..consumed]),
                }
                rest = &after[consumed..];
            }
            None => {
                out.push('\\');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn read_escape(text: &str) -> Option<(u32, usize)> {
    let hex = text.strip_prefix("\\u")?.get(..4)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().map(|unit| (unit, 6))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_unwritable_literals() {
        assert!(AttrValue::Char('\u{1}').validate().is_err());
        assert!(AttrValue::Char('\n').validate().is_ok());
        assert!(AttrValue::Url("a\u{0}b".into()).validate().is_err());
        assert!(AttrValue::Serial("\u{FFFF}".into()).validate().is_err());
        // stringvalue escapes everything it cannot write directly
        assert!(AttrValue::String("\u{1}\u{FFFE}".into()).validate().is_ok());
    }

    #[test]
    fn test_string_escapes_non_xml_characters() {
        let value = AttrValue::String("x\u{FFFE}y\u{1}".into());
        let encoded = value.encode();
        assert!(first_invalid_char(&encoded).is_none());
        assert_eq!(AttrValue::decode("stringvalue", &encoded).unwrap(), Some(value));
    }

    #[test]
    fn test_string_escapes_markup_and_controls() {
        let value = AttrValue::String("a<b>&\"c'\n".to_string());
        assert_eq!(value.encode(), "a\\u003Cb\\u003E\\u0026\\u0022c\\u0027\\u000A");
        let back = AttrValue::decode("stringvalue", &value.encode()).unwrap().unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_literal_backslash_u_survives() {
        let value = AttrValue::String("C:\\users\\x".to_string());
        let encoded = value.encode();
        assert_eq!(encoded, "C:\\u005Cusers\\x");
        assert_eq!(AttrValue::decode("stringvalue", &encoded).unwrap(), Some(value));
    }

    #[test]
    fn test_surrogate_pair_decodes() {
        let decoded = AttrValue::decode("stringvalue", "smile \\uD83D\\uDE00").unwrap();
        assert_eq!(decoded, Some(AttrValue::String("smile \u{1F600}".to_string())));
    }

    #[test]
    fn test_malformed_escape_kept_literally() {
        let decoded = AttrValue::decode("stringvalue", "\\uZZZZ and \\u12").unwrap();
        assert_eq!(decoded, Some(AttrValue::String("\\uZZZZ and \\u12".to_string())));
    }

    #[test]
    fn test_typed_decoding() {
        assert_eq!(AttrValue::decode("boolvalue", "TRUE").unwrap(), Some(AttrValue::Bool(true)));
        assert_eq!(AttrValue::decode("intvalue", " 42 ").unwrap(), Some(AttrValue::Int(42)));
        assert_eq!(AttrValue::decode("bytevalue", "-7").unwrap(), Some(AttrValue::Byte(-7)));
        assert_eq!(AttrValue::decode("charvalue", "x").unwrap(), Some(AttrValue::Char('x')));
        assert!(AttrValue::decode("intvalue", "forty").is_err());
        assert!(AttrValue::decode("bytevalue", "300").is_err());
        assert!(AttrValue::decode("charvalue", "xy").is_err());
        assert!(AttrValue::decode("boolvalue", "yes").is_err());
        assert_eq!(AttrValue::decode("mystery", "1").unwrap(), None);
    }

    #[test]
    fn test_parse_typed() {
        assert_eq!(AttrValue::parse_typed("bool", "true").unwrap(), AttrValue::Bool(true));
        assert_eq!(
            AttrValue::parse_typed("string", "a\\ub").unwrap(),
            AttrValue::String("a\\ub".to_string())
        );
        assert_eq!(
            AttrValue::parse_typed("url", "nbres:/x").unwrap(),
            AttrValue::Url("nbres:/x".to_string())
        );
        assert!(AttrValue::parse_typed("object", "x").is_err());
    }

    #[test]
    fn test_every_kind_is_listed() {
        let samples = [
            AttrValue::Bool(true),
            AttrValue::Byte(1),
            AttrValue::Short(1),
            AttrValue::Int(1),
            AttrValue::Long(1),
            AttrValue::Float(1.5),
            AttrValue::Double(2.5),
            AttrValue::Char('c'),
            AttrValue::String("s".into()),
            AttrValue::Url("u".into()),
            AttrValue::Method("m".into()),
            AttrValue::New("n".into()),
            AttrValue::Bundle("b".into()),
            AttrValue::Serial("ab".into()),
        ];
        for sample in samples {
            assert!(VALUE_KINDS.contains(&sample.xml_kind()));
            let back = AttrValue::decode(sample.xml_kind(), &sample.encode()).unwrap();
            assert_eq!(back, Some(sample));
        }
    }
}
