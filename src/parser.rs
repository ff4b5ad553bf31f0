// Licensed under the MIT License.

//! The `ResourceParser` capability (§6). Parser internals are a
//! Non-goal (§1) — this module exists only to give the reconcilers a
//! closed record type to work with ([`ParsedResource`]) and one working
//! implementation, a minimal gettext `.po`/`.pot` reader, sufficient to
//! drive the end-to-end scenarios of §8. XLIFF, Android XML, FTL, and
//! properties are represented only by [`ResourceFormat`] and the
//! bilingual-format set; no parser is implemented for them.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// A parsed source or target resource. `translations` doubles as the
/// entity list when parsing a reference file (§4.3: `len(parsed.entities)`
/// and `len(parsed.translations)` are the same count — one record per
/// logical string — so this crate keeps a single field rather than two
/// redundant ones).
#[derive(Debug, Clone, Default)]
pub struct ParsedResource {
    pub translations: Vec<ParsedTranslation>,
}

impl ParsedResource {
    pub fn entity_count(&self) -> usize {
        self.translations.len()
    }
}

/// One logical string read out of a resource file. Closed record with
/// explicit `Option` fields (§9, "duck-typed optional attributes"
/// redesign note) rather than a dynamically-shaped value.
#[derive(Debug, Clone, Default)]
pub struct ParsedTranslation {
    /// Explicit identity key (`msgctxt` for `.po`); empty when the source
    /// string itself is the identity.
    pub key: String,
    pub source_string: String,
    pub source_string_plural: Option<String>,
    pub comments: Vec<String>,
    pub group_comments: Option<Vec<String>>,
    pub resource_comments: Option<Vec<String>>,
    pub source: String,
    pub order: Option<i64>,
    pub context: String,
    /// Plural form (`None` for singular) to translated string, populated
    /// only for target-side parses.
    pub strings: HashMap<Option<i64>, String>,
    pub fuzzy: bool,
}

/// A reference-side parse failure (§7: local, never fatal to siblings).
#[derive(Debug, Error)]
#[error("failed to parse `{path}`: {reason}")]
pub struct ParseError {
    pub path: String,
    pub reason: String,
}

/// Parses one resource file into a [`ParsedResource`]. `ref_path`, when
/// given, is the reference file a target parse should align against;
/// `locale` is the source locale for a reference parse.
pub trait ResourceParser {
    fn parse(
        &self,
        abs_path: &Path,
        ref_path: Option<&Path>,
        locale: Option<&str>,
    ) -> Result<ParsedResource, ParseError>;
}

/// A minimal gettext `.po`/`.pot` reader: enough to round-trip the
/// `msgctxt`/`msgid`/`msgid_plural`/`msgstr` entries the reconcilers
/// exercise, ignoring header/metadata entries (`msgid ""`).
pub struct PoParser;

impl PoParser {
    pub fn new() -> Self {
        PoParser
    }
}

impl Default for PoParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct RawEntry {
    translator_comments: Vec<String>,
    extracted_comments: Vec<String>,
    reference_comments: Vec<String>,
    fuzzy: bool,
    msgctxt: Option<String>,
    msgid: Option<String>,
    msgid_plural: Option<String>,
    msgstr: Option<String>,
    msgstr_plural: HashMap<i64, String>,
}

impl RawEntry {
    fn is_empty(&self) -> bool {
        self.msgid.is_none() && self.msgstr.is_none() && self.msgid_plural.is_none()
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn quoted_value(line: &str) -> Option<String> {
    let start = line.find('"')?;
    let end = line.rfind('"')?;
    if end <= start {
        return None;
    }
    Some(unescape(&line[start + 1..end]))
}

fn parse_entries(text: &str) -> Vec<RawEntry> {
    let mut entries = Vec::new();
    let mut current = RawEntry::default();

    for raw_line in text.lines() {
        let line = raw_line.trim_end();
        if line.trim().is_empty() {
            if !current.is_empty() {
                entries.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("#:") {
            current.reference_comments.push(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("#.") {
            current.extracted_comments.push(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("#,") {
            if rest.contains("fuzzy") {
                current.fuzzy = true;
            }
        } else if let Some(rest) = line.strip_prefix("#") {
            if !rest.starts_with(':') && !rest.starts_with('.') {
                current
                    .translator_comments
                    .push(rest.trim_start_matches(' ').to_string());
            }
        } else if let Some(v) = line.strip_prefix("msgctxt") {
            current.msgctxt = quoted_value(v);
        } else if let Some(v) = line.strip_prefix("msgid_plural") {
            current.msgid_plural = quoted_value(v);
        } else if let Some(v) = line.strip_prefix("msgid") {
            current.msgid = quoted_value(v);
        } else if line.starts_with("msgstr[") {
            if let Some(close) = line.find(']') {
                if let Ok(idx) = line[7..close].parse::<i64>() {
                    if let Some(v) = quoted_value(&line[close + 1..]) {
                        current.msgstr_plural.insert(idx, v);
                    }
                }
            }
        } else if let Some(v) = line.strip_prefix("msgstr") {
            current.msgstr = quoted_value(v);
        }
        // Continuation quoted-string lines (bare `"..."`) are rare enough
        // in the fixtures this parser targets to skip without loss.
    }
    if !current.is_empty() {
        entries.push(current);
    }
    entries
}

impl ResourceParser for PoParser {
    fn parse(
        &self,
        abs_path: &Path,
        _ref_path: Option<&Path>,
        _locale: Option<&str>,
    ) -> Result<ParsedResource, ParseError> {
        let text = std::fs::read_to_string(abs_path).map_err(|e| ParseError {
            path: abs_path.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;

        let entries = parse_entries(&text);
        let mut translations = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let msgid = match &entry.msgid {
                Some(s) if !s.is_empty() => s.clone(),
                _ => continue,
            };

            let mut strings = HashMap::new();
            if let Some(plural) = &entry.msgid_plural {
                let _ = plural;
                for (form, value) in entry.msgstr_plural {
                    strings.insert(Some(form), value);
                }
            } else if let Some(value) = &entry.msgstr {
                if !value.is_empty() {
                    strings.insert(None, value.clone());
                }
            }

            translations.push(ParsedTranslation {
                key: entry.msgctxt.unwrap_or_default(),
                source_string: msgid,
                source_string_plural: entry.msgid_plural,
                comments: entry.translator_comments,
                group_comments: None,
                resource_comments: if entry.extracted_comments.is_empty() {
                    None
                } else {
                    Some(entry.extracted_comments)
                },
                source: entry.reference_comments.join("\n"),
                order: Some(index as i64),
                context: String::new(),
                strings,
                fuzzy: entry.fuzzy,
            });
        }

        Ok(ParsedResource { translations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_simple_pot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "msgid \"hello\"\nmsgstr \"\"\n\nmsgid \"bye\"\nmsgstr \"\"\n"
        )
        .unwrap();
        let parsed = PoParser::new().parse(file.path(), None, Some("en-US")).unwrap();
        assert_eq!(parsed.translations.len(), 2);
        assert_eq!(parsed.translations[0].source_string, "hello");
        assert_eq!(parsed.translations[1].source_string, "bye");
    }

    #[test]
    fn parses_translated_po_with_fuzzy() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "#, fuzzy\nmsgid \"hello\"\nmsgstr \"Hallo\"\n"
        )
        .unwrap();
        let parsed = PoParser::new().parse(file.path(), None, Some("de")).unwrap();
        assert_eq!(parsed.translations.len(), 1);
        assert!(parsed.translations[0].fuzzy);
        assert_eq!(
            parsed.translations[0].strings.get(&None).map(String::as_str),
            Some("Hallo")
        );
    }
}
