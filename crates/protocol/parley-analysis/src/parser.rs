//! Strict parser for the bracketed extraction schema.
//!
//! The model is instructed to answer in exactly this shape:
//!
//! ```text
//! [response]
//! the assistant's reply
//! [/response]
//! [analysis]
//! [subject name="pizza baking" isNew="true"]
//! short description of the theme
//! [keyword term="pizza" confidence="0.9"/]
//! [keyword term="dough" confidence="0.8"/]
//! [/subject]
//! [summaryUpdate]
//! updated running summary
//! [/summaryUpdate]
//! [/analysis]
//! ```
//!
//! The analysis section is optional; everything else is mandatory and
//! validated. Any deviation fails the whole extraction — there is no text
//! fallback.

use crate::error::{AnalysisError, AnalysisResult};

/// One `keyword` element.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedKeyword {
    pub term: String,
    pub confidence: f64,
}

/// One `subject` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSubject {
    pub name: String,
    pub description: String,
    pub is_new: bool,
    pub keywords: Vec<ExtractedKeyword>,
}

/// The optional `analysis` section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisBlock {
    pub subjects: Vec<ExtractedSubject>,
    pub summary_update: Option<String>,
}

/// A fully parsed model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutput {
    pub response: String,
    pub analysis: Option<AnalysisBlock>,
}

/// Parse a model reply, strictly.
pub fn parse_extraction(raw: &str) -> AnalysisResult<ExtractionOutput> {
    let mut rest = raw.trim();

    let (response, after) = take_block(rest, "response")?;
    rest = after.trim_start();

    let analysis = if rest.is_empty() {
        None
    } else {
        let (body, after) = take_block(rest, "analysis")?;
        if !after.trim().is_empty() {
            return Err(AnalysisError::Malformed(format!(
                "trailing content after [/analysis]: {:?}",
                truncate(after.trim())
            )));
        }
        Some(parse_analysis(&body)?)
    };

    Ok(ExtractionOutput { response: response.trim().to_string(), analysis })
}

fn parse_analysis(body: &str) -> AnalysisResult<AnalysisBlock> {
    let mut rest = body.trim();
    let mut block = AnalysisBlock::default();

    while !rest.is_empty() {
        if rest.starts_with("[subject") {
            let (attributes, inner, after) = take_attributed_block(rest, "subject")?;
            let name = require_attribute(&attributes, "name")?;
            let is_new = match attribute(&attributes, "isNew") {
                Some(value) => parse_bool(&value)?,
                None => false,
            };
            let (description, keywords) = parse_subject_body(&inner)?;
            if keywords.is_empty() {
                return Err(AnalysisError::Malformed(format!(
                    "subject {name:?} has no keywords"
                )));
            }
            block.subjects.push(ExtractedSubject { name, description, is_new, keywords });
            rest = after.trim_start();
        } else if rest.starts_with("[summaryUpdate]") {
            if block.summary_update.is_some() {
                return Err(AnalysisError::Malformed("duplicate summaryUpdate".into()));
            }
            let (body, after) = take_block(rest, "summaryUpdate")?;
            block.summary_update = Some(body.trim().to_string());
            rest = after.trim_start();
        } else {
            return Err(AnalysisError::Malformed(format!(
                "unexpected content in analysis: {:?}",
                truncate(rest)
            )));
        }
    }
    Ok(block)
}

fn parse_subject_body(body: &str) -> AnalysisResult<(String, Vec<ExtractedKeyword>)> {
    let mut description = String::new();
    let mut keywords = Vec::new();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("[keyword") {
            if !line.ends_with("/]") {
                return Err(AnalysisError::Malformed(format!(
                    "keyword element must self-close: {:?}",
                    truncate(line)
                )));
            }
            let attributes = parse_attributes(&line["[keyword".len()..line.len() - 2])?;
            let term = require_attribute(&attributes, "term")?;
            let confidence = require_attribute(&attributes, "confidence")?
                .parse::<f64>()
                .map_err(|_| {
                    AnalysisError::Malformed(format!("confidence is not a number: {line:?}"))
                })?;
            if !(0.0..=1.0).contains(&confidence) {
                return Err(AnalysisError::Malformed(format!(
                    "confidence {confidence} outside [0, 1]"
                )));
            }
            keywords.push(ExtractedKeyword { term: term.to_lowercase(), confidence });
        } else if line.starts_with('[') {
            return Err(AnalysisError::Malformed(format!(
                "unexpected element in subject: {:?}",
                truncate(line)
            )));
        } else {
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(line);
        }
    }
    Ok((description, keywords))
}

/// Extract `[tag]body[/tag]` from the start of `input`, returning the
/// body and the remainder after the close tag.
fn take_block<'a>(input: &'a str, tag: &str) -> AnalysisResult<(String, &'a str)> {
    let open = format!("[{tag}]");
    let close = format!("[/{tag}]");
    let rest = input.strip_prefix(open.as_str()).ok_or_else(|| {
        AnalysisError::Malformed(format!("expected [{tag}], found {:?}", truncate(input)))
    })?;
    let end = rest.find(close.as_str()).ok_or_else(|| {
        AnalysisError::Malformed(format!("missing [/{tag}]"))
    })?;
    Ok((rest[..end].to_string(), &rest[end + close.len()..]))
}

/// Extract `[tag attr="v"]body[/tag]` from the start of `input`.
fn take_attributed_block<'a>(
    input: &'a str,
    tag: &str,
) -> AnalysisResult<(Vec<(String, String)>, String, &'a str)> {
    let open = format!("[{tag}");
    let close = format!("[/{tag}]");
    let rest = input.strip_prefix(open.as_str()).ok_or_else(|| {
        AnalysisError::Malformed(format!("expected [{tag} ...], found {:?}", truncate(input)))
    })?;
    let header_end = rest
        .find(']')
        .ok_or_else(|| AnalysisError::Malformed(format!("unterminated [{tag} header")))?;
    let attributes = parse_attributes(&rest[..header_end])?;
    let body_start = &rest[header_end + 1..];
    let end = body_start
        .find(close.as_str())
        .ok_or_else(|| AnalysisError::Malformed(format!("missing [/{tag}]")))?;
    Ok((attributes, body_start[..end].to_string(), &body_start[end + close.len()..]))
}

/// Parse `key="value"` pairs.
fn parse_attributes(input: &str) -> AnalysisResult<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    let mut rest = input.trim();
    while !rest.is_empty() {
        let eq = rest.find('=').ok_or_else(|| {
            AnalysisError::Malformed(format!("attribute without value: {:?}", truncate(rest)))
        })?;
        let key = rest[..eq].trim().to_string();
        let after_eq = rest[eq + 1..].trim_start();
        let value_body = after_eq.strip_prefix('"').ok_or_else(|| {
            AnalysisError::Malformed(format!("attribute value must be quoted: {:?}", truncate(rest)))
        })?;
        let end_quote = value_body.find('"').ok_or_else(|| {
            AnalysisError::Malformed(format!("unterminated attribute value: {:?}", truncate(rest)))
        })?;
        attributes.push((key, value_body[..end_quote].to_string()));
        rest = value_body[end_quote + 1..].trim_start();
    }
    Ok(attributes)
}

fn attribute(attributes: &[(String, String)], key: &str) -> Option<String> {
    attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

fn require_attribute(attributes: &[(String, String)], key: &str) -> AnalysisResult<String> {
    attribute(attributes, key)
        .ok_or_else(|| AnalysisError::Malformed(format!("missing attribute {key:?}")))
}

fn parse_bool(value: &str) -> AnalysisResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(AnalysisError::Malformed(format!("expected true/false, got {other:?}"))),
    }
}

fn truncate(s: &str) -> String {
    const LIMIT: usize = 48;
    if s.len() <= LIMIT {
        s.to_string()
    } else {
        let mut end = LIMIT;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
