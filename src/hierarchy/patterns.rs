use anyhow::{Context, Result};
use regex::{Captures, Regex};

use crate::grammar::{division_number_value, roman_value};
use crate::model::{DivisionKind, DocumentKind, ParagraphKind};

/// What a single normalized line is, structurally.
#[derive(Debug, Clone, PartialEq)]
pub enum LineRole {
    TableOfContents,
    AmendmentNote,
    TransitionalHeading,
    DivisionHeading {
        kind: DivisionKind,
        number: String,
        value: u32,
        name: String,
    },
    ArticleHeader {
        raw_id: String,
        rest: String,
        rule: bool,
        /// Terminated with a dash (`5o.-`), which citations never use.
        dashed: bool,
    },
    Body,
}

/// Whether the line read before the current one left a clause open. A
/// header-shaped line continuing an open clause is a wrapped citation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineFlow {
    open_clause: bool,
}

impl LineFlow {
    pub fn advance(&mut self, role: &LineRole, text: &str) {
        self.open_clause = match role {
            LineRole::Body | LineRole::ArticleHeader { .. } => ends_mid_clause(text),
            _ => false,
        };
    }

    /// Division name lines end the clause of their heading.
    pub fn close(&mut self) {
        self.open_clause = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeadingShape {
    pub kind: ParagraphKind,
    pub label: String,
    pub body: String,
}

pub struct LinePatterns {
    toc_line: Regex,
    amendment_note: Regex,
    transitional_heading: Regex,
    division_heading: Regex,
    article_header: Regex,
    rule_header: Regex,
    transitional_article: Regex,
    fraction: Regex,
    sub_item: Regex,
    numeral: Regex,
    heading_letter: Regex,
}

const ORDINAL_WORD: &str = r"(?:(?:d[ée]cim|vig[ée]sim|trig[ée]sim|cuadrag[ée]sim)[oa]\s*)?(?:primer[oa]|segund[oa]|tercer[oa]|cuart[oa]|quint[oa]|sext[oa]|s[ée]ptim[oa]|octav[oa]|noven[oa])|d[ée]cim[oa]|vig[ée]sim[oa]|trig[ée]sim[oa]|[úu]nic[oa]";

/// Longest plausible identifier between `Artículo` and its terminator.
const MAX_IDENTIFIER_LEN: usize = 24;
const MAX_IDENTIFIER_WORDS: usize = 3;
const MAX_AMENDMENT_NOTE_LEN: usize = 240;

impl LinePatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            toc_line: Regex::new(r"\.{3,}\s*\d+\s*$").context("failed to compile toc regex")?,
            amendment_note: Regex::new(
                r"(?i)^(?:art[íi]culos?|fracci[óo]n(?:es)?|p[áa]rrafos?|incisos?|numerales?|apartados?|reglas?|cap[íi]tulos?|t[íi]tulos?|secci[óo]n(?:es)?|libros?|denominaci[óo]n|fe\s+de\s+erratas)\b.{0,160}?\b(?:reformad[oa]s?|adicionad[oa]s?|derogad[oa]s?|recorrid[oa]s?|abrogad[oa]s?)\b.*\bDOF\b.*$",
            )
            .context("failed to compile amendment regex")?,
            transitional_heading: Regex::new(
                r"(?i)^(?:art[íi]culos?\s+)?transitorios?(?:\s+del?\s+.{0,120})?\.?$",
            )
            .context("failed to compile transitional heading regex")?,
            division_heading: Regex::new(&format!(
                r"(?i)^(?P<kind>libro|t[íi]tulo|cap[íi]tulo|subsecci[óo]n|secci[óo]n)\s+(?P<number>[ivxlcdm]+|\d+|{ORDINAL_WORD})\b\s*[.\-–—:]*\s*(?P<name>.*)$"
            ))
            .context("failed to compile division heading regex")?,
            article_header: Regex::new(
                r"^(?:ART[ÍI]CULO|Art[íi]culo|ART\.|Art\.)\s+(?P<id>\d+(?:\.\d+)+|\d[^.:]*?)\s*(?P<term>\.\s*[-–—]|\.|[-–—]\s|:|$)\s*(?P<rest>.*)$",
            )
            .context("failed to compile article header regex")?,
            rule_header: Regex::new(
                r"^(?:(?:REGLA|Regla)\s+)?(?P<id>\d{1,2}\.\d{1,3}\.\d{1,3}(?:\.\d{1,3})?)\.?(?P<term>\s*[-–—])?(?:\s+(?P<rest>.*))?$",
            )
            .context("failed to compile rule header regex")?,
            transitional_article: Regex::new(&format!(
                r"(?i)^(?:art[íi]culo\s+)?(?P<id>{ORDINAL_WORD})\s*(?P<term>\.\s*[-–—]|\.|[-–—]|:)\s*(?P<rest>.*)$"
            ))
            .context("failed to compile transitional article regex")?,
            fraction: Regex::new(r"^(?P<label>[IVXLC]+)\s*(?:\.\s*[-–—]?|[-–—])\s*(?P<body>.*)$")
                .context("failed to compile fraction regex")?,
            sub_item: Regex::new(r"^(?P<label>[a-zñ]{1,2})\)\s*(?P<body>.*)$")
                .context("failed to compile sub-item regex")?,
            numeral: Regex::new(r"^(?P<label>\d{1,2})(?:\.\s*[-–—]?|\))\s+(?P<body>.*)$")
                .context("failed to compile numeral regex")?,
            heading_letter: Regex::new(r"^(?P<label>[A-Z])\s*(?:\.\s*[-–—]?|\))\s+(?P<body>.*)$")
                .context("failed to compile heading-letter regex")?,
        })
    }

    /// Classifies one line. Inside a transitional block, spelled ordinals
    /// (`PRIMERO.-`) and numbered articles both open transitional articles and
    /// division headings are not recognized.
    pub fn classify(&self, text: &str, transitional: bool, document_kind: DocumentKind) -> LineRole {
        let line = text.trim();
        if line.is_empty() {
            return LineRole::Body;
        }
        if self.toc_line.is_match(line) {
            return LineRole::TableOfContents;
        }
        if line.chars().count() <= 160 && self.transitional_heading.is_match(line) {
            return LineRole::TransitionalHeading;
        }

        if !transitional {
            if let Some(role) = self.division_heading(line) {
                return role;
            }
        } else if let Some(role) = self
            .transitional_article
            .captures(line)
            .and_then(|captures| header_role(&captures, false))
        {
            return role;
        }

        if let Some(captures) = self.article_header.captures(line) {
            let raw_id = captures.name("id").map(|value| value.as_str().trim()).unwrap_or("");
            if plausible_identifier(raw_id) {
                if let Some(role) = header_role(&captures, false) {
                    return role;
                }
            }
        }

        if document_kind == DocumentKind::Resolution {
            if let Some(role) = self
                .rule_header
                .captures(line)
                .and_then(|captures| header_role(&captures, true))
            {
                return role;
            }
        }

        if line.chars().count() <= MAX_AMENDMENT_NOTE_LEN && self.amendment_note.is_match(line) {
            return LineRole::AmendmentNote;
        }

        LineRole::Body
    }

    /// `classify` for a line read in document order. A header without a dash
    /// terminator (`Artículo 2o. de`, `2.1.1.`) that continues an open clause
    /// is body text.
    pub fn classify_in_flow(
        &self,
        text: &str,
        flow: LineFlow,
        transitional: bool,
        document_kind: DocumentKind,
    ) -> LineRole {
        match self.classify(text, transitional, document_kind) {
            LineRole::ArticleHeader { dashed: false, .. } if flow.open_clause => LineRole::Body,
            role => role,
        }
    }

    fn division_heading(&self, line: &str) -> Option<LineRole> {
        let captures = self.division_heading.captures(line)?;
        let kind = DivisionKind::from_keyword(captures.name("kind")?.as_str())?;
        let number = captures.name("number")?.as_str().trim().to_string();
        let value = division_number_value(&number)?;
        let name = captures
            .name("name")
            .map(|value| value.as_str().trim().to_string())
            .unwrap_or_default();

        // "Capítulo II de esta Ley" and "Capítulo II, Sección..." are
        // cross-references, not headings.
        if !name.chars().next().map(char::is_uppercase).unwrap_or(true) {
            return None;
        }

        Some(LineRole::DivisionHeading {
            kind,
            number,
            value,
            name,
        })
    }

    /// Leading-token shape of a body line. Ambiguous single letters that are
    /// also roman numerals come back as fractions; the caller resolves them
    /// against the open heading-letter sequence.
    pub fn leading_shape(&self, text: &str) -> LeadingShape {
        let line = text.trim();

        if let Some(captures) = self.fraction.captures(line) {
            let label = capture(&captures, "label");
            if roman_value(&label).is_some() {
                return LeadingShape {
                    kind: ParagraphKind::Fraction,
                    label,
                    body: capture(&captures, "body"),
                };
            }
        }

        for (regex, kind) in [
            (&self.sub_item, ParagraphKind::SubItem),
            (&self.numeral, ParagraphKind::Numeral),
            (&self.heading_letter, ParagraphKind::HeadingLetter),
        ] {
            if let Some(captures) = regex.captures(line) {
                return LeadingShape {
                    kind,
                    label: capture(&captures, "label"),
                    body: capture(&captures, "body"),
                };
            }
        }

        LeadingShape {
            kind: ParagraphKind::Text,
            label: String::new(),
            body: line.to_string(),
        }
    }

    /// Splits a header's identifier and trailing text, used for the leading
    /// emphasized run of a line.
    pub fn header_rest<'a>(&self, text: &'a str) -> Option<&'a str> {
        let captures = self
            .article_header
            .captures(text.trim())
            .or_else(|| self.rule_header.captures(text.trim()))?;
        let rest = captures.name("rest")?;
        Some(&text.trim()[rest.start()..rest.end()])
    }
}

/// `None` when the text after the identifier starts in lowercase: the line
/// cites an article (`Artículo 2o. de esta Ley`) rather than opening one.
fn header_role(captures: &Captures<'_>, rule: bool) -> Option<LineRole> {
    let rest = capture(captures, "rest");
    if rest.chars().next().map(char::is_lowercase).unwrap_or(false) {
        return None;
    }
    let dashed = captures
        .name("term")
        .map(|term| term.as_str().contains(['-', '–', '—']))
        .unwrap_or(false);

    Some(LineRole::ArticleHeader {
        raw_id: capture(captures, "id"),
        rest,
        rule,
        dashed,
    })
}

fn ends_mid_clause(text: &str) -> bool {
    text.trim_end()
        .chars()
        .last()
        .map(|ch| ch.is_lowercase() || ch == ',')
        .unwrap_or(false)
}

fn capture(captures: &Captures<'_>, name: &str) -> String {
    captures
        .name(name)
        .map(|value| value.as_str().trim().to_string())
        .unwrap_or_default()
}

fn plausible_identifier(raw: &str) -> bool {
    !raw.is_empty()
        && raw.chars().count() <= MAX_IDENTIFIER_LEN
        && raw.split_whitespace().count() <= MAX_IDENTIFIER_WORDS
}
