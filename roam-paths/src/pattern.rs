//! Path template compilation and per-segment matching.
//!
//! A template describes one route node's own slice of the URL:
//!
//! ```text
//! /users/:id/files/*rest?tab&sort
//! ```
//!
//! Static segments must match literally, `:id` captures one segment,
//! `*rest` captures every remaining segment, and the `?tab&sort` suffix
//! declares which query params belong to this node.

use serde_json::Value;

use crate::error::PathError;
use crate::options::UrlParamsEncoding;
use crate::Params;

/// The role a param plays inside a matched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Url,
    Splat,
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SegmentPart {
    Static(String),
    Param(String),
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    template: String,
    parts: Vec<SegmentPart>,
    splat: Option<String>,
    query_params: Vec<String>,
    trailing_slash: bool,
}

impl PathPattern {
    /// Compile a template. Fails on empty or duplicate param names.
    pub fn parse(template: &str) -> Result<PathPattern, PathError> {
        let (path_part, query_part) = match template.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (template, None),
        };

        let (pattern, splat) = match path_part.split_once("/*") {
            Some((p, s)) => {
                if s.is_empty() || s.contains('/') {
                    return Err(PathError::InvalidTemplate {
                        template: template.to_string(),
                        reason: "splat must be the final segment and must be named".to_string(),
                    });
                }
                (p, Some(s.to_string()))
            }
            None => (path_part, None),
        };

        let mut parts = Vec::new();
        for segment in pattern.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PathError::InvalidTemplate {
                        template: template.to_string(),
                        reason: "param segment with no name".to_string(),
                    });
                }
                parts.push(SegmentPart::Param(name.to_string()));
            } else {
                parts.push(SegmentPart::Static(segment.to_string()));
            }
        }

        let query_params: Vec<String> = match query_part {
            Some(q) => q
                .split('&')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
            None => Vec::new(),
        };

        let pattern = PathPattern {
            template: template.to_string(),
            parts,
            splat,
            query_params,
            trailing_slash: pattern.len() > 1 && pattern.ends_with('/'),
        };

        let mut seen = Vec::new();
        for name in pattern.param_names() {
            if seen.contains(&name) {
                return Err(PathError::InvalidTemplate {
                    template: template.to_string(),
                    reason: format!("duplicate param '{}'", name),
                });
            }
            seen.push(name);
        }

        Ok(pattern)
    }

    /// The original template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Names of the single-segment URL params, in template order.
    pub fn url_params(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                SegmentPart::Param(name) => Some(name.as_str()),
                SegmentPart::Static(_) => None,
            })
            .collect()
    }

    /// The splat param name, if the template ends in `/*name`.
    pub fn splat_param(&self) -> Option<&str> {
        self.splat.as_deref()
    }

    /// Declared query param names.
    pub fn query_params(&self) -> Vec<&str> {
        self.query_params.iter().map(|s| s.as_str()).collect()
    }

    /// Every param name with its kind, URL params first.
    pub fn param_names(&self) -> Vec<&str> {
        let mut names = self.url_params();
        names.extend(self.splat_param());
        names.extend(self.query_params.iter().map(|s| s.as_str()));
        names
    }

    /// The kind of a param declared by this template, if any.
    pub fn kind_of(&self, param: &str) -> Option<ParamKind> {
        if self.url_params().contains(&param) {
            Some(ParamKind::Url)
        } else if self.splat_param() == Some(param) {
            Some(ParamKind::Splat)
        } else if self.query_params.iter().any(|q| q == param) {
            Some(ParamKind::Query)
        } else {
            None
        }
    }

    pub(crate) fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    pub(crate) fn segment_count(&self) -> usize {
        self.parts.len()
    }

    /// Specificity class used to order sibling nodes during matching:
    /// static-leading templates first, then param-leading, then bare
    /// splats, then empty templates.
    pub(crate) fn specificity_class(&self) -> u8 {
        match self.parts.first() {
            Some(SegmentPart::Static(_)) => 0,
            Some(SegmentPart::Param(_)) => 1,
            None if self.splat.is_some() => 2,
            None => 3,
        }
    }

    /// Match this pattern against a prefix of `segments`.
    ///
    /// Returns the number of segments consumed and the captured params, or
    /// `None` when a static segment differs, too few segments remain, or a
    /// captured value fails to decode. A splat consumes every remaining
    /// segment.
    pub(crate) fn match_segments(
        &self,
        segments: &[&str],
        encoding: UrlParamsEncoding,
    ) -> Option<(usize, Params)> {
        if segments.len() < self.parts.len() {
            return None;
        }

        let mut params = Params::new();
        for (part, seg) in self.parts.iter().zip(segments.iter()) {
            match part {
                SegmentPart::Static(expected) => {
                    if expected != seg {
                        return None;
                    }
                }
                SegmentPart::Param(name) => {
                    let value = decode_param(seg, encoding)?;
                    params.insert(name.clone(), Value::String(value));
                }
            }
        }

        match &self.splat {
            Some(name) => {
                let rest = &segments[self.parts.len()..];
                let mut decoded = Vec::with_capacity(rest.len());
                for seg in rest {
                    decoded.push(decode_param(seg, encoding)?);
                }
                params.insert(name.clone(), Value::String(decoded.join("/")));
                Some((segments.len(), params))
            }
            None => Some((self.parts.len(), params)),
        }
    }

    /// Render this pattern's segments from `params`.
    ///
    /// Fails with the missing param name when a URL or splat param has no
    /// value.
    pub(crate) fn build_segments(
        &self,
        params: &Params,
        encoding: UrlParamsEncoding,
    ) -> Result<Vec<String>, String> {
        let mut out = Vec::with_capacity(self.parts.len() + 1);
        for part in &self.parts {
            match part {
                SegmentPart::Static(text) => out.push(text.clone()),
                SegmentPart::Param(name) => {
                    let value = params.get(name).ok_or_else(|| name.clone())?;
                    out.push(encode_param(&param_to_string(value), ParamKind::Url, encoding));
                }
            }
        }
        if let Some(name) = &self.splat {
            let value = params.get(name).ok_or_else(|| name.clone())?;
            let rendered = encode_param(&param_to_string(value), ParamKind::Splat, encoding);
            if !rendered.is_empty() {
                out.push(rendered);
            }
        }
        Ok(out)
    }
}

/// Stringify a param value for use inside a path segment.
pub(crate) fn param_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn byte_escape(out: &mut String, ch: char) {
    let mut buf = [0u8; 4];
    for b in ch.encode_utf8(&mut buf).bytes() {
        out.push('%');
        out.push_str(&format!("{:02X}", b));
    }
}

fn encode_keeping(value: &str, keep: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || "-_.~".contains(ch) || keep.contains(ch) {
            out.push(ch);
        } else {
            byte_escape(&mut out, ch);
        }
    }
    out
}

/// Percent-encode a param value according to the configured mode.
pub(crate) fn encode_param(value: &str, kind: ParamKind, encoding: UrlParamsEncoding) -> String {
    match encoding {
        UrlParamsEncoding::None => value.to_string(),
        UrlParamsEncoding::UriComponent => encode_keeping(value, "!'()*"),
        UrlParamsEncoding::Uri => encode_keeping(value, ";,/?:@&=+$!*'()#"),
        UrlParamsEncoding::Default => match kind {
            // Splat values span segments, so their separators survive.
            ParamKind::Splat => encode_keeping(value, "!'()*/"),
            _ => encode_keeping(value, "!'()*"),
        },
    }
}

/// Percent-decode a captured value; `None` when the escape sequence is
/// malformed or decodes to invalid UTF-8.
pub(crate) fn decode_param(raw: &str, encoding: UrlParamsEncoding) -> Option<String> {
    match encoding {
        UrlParamsEncoding::None => Some(raw.to_string()),
        _ => urlencoding::decode(raw).ok().map(|cow| cow.into_owned()),
    }
}
