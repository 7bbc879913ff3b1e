//! Field rendering for column values.
//!
//! A [`Layout`] is a template of literal text and `${renderer}` tokens parsed
//! once at configuration load and rendered against each [`LogRecord`]:
//!
//! - `${longdate}` - `2024-01-31 13:45:10.123`
//! - `${date}` / `${date:format=%H:%M}` - strftime formatted timestamp
//! - `${level}`, `${logger}`, `${message}`, `${exception}`
//! - `${guid}` - a fresh random UUID per render
//! - `${property:name}` / `${event-properties:item=name}` - structured property

mod record;

pub use record::{Level, LogRecord};

use crate::error::{LayoutError, RenderError};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Write;
use std::str::FromStr;
use uuid::Uuid;

const LONGDATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const DEFAULT_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq)]
enum Renderer {
    LongDate,
    Date(String),
    Level,
    Logger,
    Message,
    Exception,
    Guid,
    Property(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Token(Renderer),
}

/// Parsed rendering template bound to a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    source: String,
    segments: Vec<Segment>,
}

impl Layout {
    /// Parse a layout template.
    pub fn parse(text: &str) -> Result<Self, LayoutError> {
        let mut segments = Vec::new();
        let mut rest = text;
        let mut offset = 0;

        while let Some(start) = rest.find("${") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or(LayoutError::Unterminated {
                position: offset + start,
            })?;
            let token = after[..end].trim();
            if token.is_empty() {
                return Err(LayoutError::Empty {
                    position: offset + start,
                });
            }
            segments.push(Segment::Token(parse_renderer(token)?));

            let consumed = start + 2 + end + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: text.to_string(),
            segments,
        })
    }

    /// The template text this layout was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the layout against a record.
    pub fn render(&self, record: &LogRecord) -> Result<String, RenderError> {
        let mut out = String::with_capacity(self.source.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(renderer) => render_token(renderer, record, &mut out)?,
            }
        }
        Ok(out)
    }
}

fn parse_renderer(token: &str) -> Result<Renderer, LayoutError> {
    // Only the first colon separates the name; date formats contain colons.
    let (name, option) = match token.split_once(':') {
        Some((name, option)) => (name.trim(), Some(option.trim())),
        None => (token, None),
    };

    match name.to_ascii_lowercase().as_str() {
        "longdate" => Ok(Renderer::LongDate),
        "date" => {
            let format = match option {
                Some(opt) => opt.strip_prefix("format=").unwrap_or(opt).to_string(),
                None => DEFAULT_DATE_FORMAT.to_string(),
            };
            if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
                return Err(LayoutError::InvalidDateFormat(format));
            }
            Ok(Renderer::Date(format))
        }
        "level" => Ok(Renderer::Level),
        "logger" => Ok(Renderer::Logger),
        "message" => Ok(Renderer::Message),
        "exception" => Ok(Renderer::Exception),
        "guid" => Ok(Renderer::Guid),
        "property" | "event-properties" => {
            let key = option
                .map(|opt| opt.strip_prefix("item=").unwrap_or(opt))
                .filter(|key| !key.is_empty())
                .ok_or_else(|| LayoutError::MissingOption {
                    renderer: name.to_string(),
                    option: "item".to_string(),
                })?;
            Ok(Renderer::Property(key.to_string()))
        }
        other => Err(LayoutError::UnknownRenderer(other.to_string())),
    }
}

fn render_token(
    renderer: &Renderer,
    record: &LogRecord,
    out: &mut String,
) -> Result<(), RenderError> {
    match renderer {
        Renderer::LongDate => write_date(record, LONGDATE_FORMAT, out),
        Renderer::Date(format) => write_date(record, format, out),
        Renderer::Level => {
            out.push_str(record.level.as_str());
            Ok(())
        }
        Renderer::Logger => {
            out.push_str(&record.logger);
            Ok(())
        }
        Renderer::Message => {
            out.push_str(&record.message);
            Ok(())
        }
        Renderer::Exception => {
            if let Some(exception) = &record.exception {
                out.push_str(exception);
            }
            Ok(())
        }
        Renderer::Guid => {
            out.push_str(&Uuid::new_v4().to_string());
            Ok(())
        }
        Renderer::Property(key) => {
            match record.properties.get(key) {
                None | Some(serde_json::Value::Null) => {}
                Some(serde_json::Value::String(s)) => out.push_str(s),
                Some(other) => out.push_str(&other.to_string()),
            }
            Ok(())
        }
    }
}

fn write_date(record: &LogRecord, format: &str, out: &mut String) -> Result<(), RenderError> {
    write!(out, "{}", record.timestamp.format(format))
        .map_err(|_| RenderError(format!("cannot format timestamp with `{}`", format)))
}

impl FromStr for Layout {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Layout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Layout::parse(&text).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Layout {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}
