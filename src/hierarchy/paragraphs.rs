use anyhow::{Result, bail};
use tracing::warn;

use super::patterns::{LeadingShape, LinePatterns};
use crate::config::{BandPolicy, IndentBand};
use crate::grammar::roman_value;
use crate::model::{ExtractionIssue, IssueKind, ParagraphKind, ParagraphNode};
use crate::sources::Token;
use crate::util::normalize_whitespace;

/// Flat paragraph tree for one article: node ids are indices, and a parent
/// must exist before any child referencing it is pushed.
#[derive(Debug, Clone, Default)]
pub struct ParagraphArena {
    nodes: Vec<ParagraphNode>,
}

impl ParagraphArena {
    pub fn push(
        &mut self,
        parent: Option<usize>,
        kind: ParagraphKind,
        label: String,
        text: String,
        depth: usize,
    ) -> Result<usize> {
        if let Some(parent) = parent {
            if parent >= self.nodes.len() {
                bail!(
                    "paragraph parent {parent} does not exist (arena holds {} nodes)",
                    self.nodes.len()
                );
            }
        }

        let id = self.nodes.len();
        self.nodes.push(ParagraphNode {
            id,
            parent,
            kind,
            label,
            text,
            depth,
        });
        Ok(id)
    }

    pub fn get(&self, id: usize) -> Option<&ParagraphNode> {
        self.nodes.get(id)
    }

    fn append_text(&mut self, id: usize, text: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.text = join_text(&node.text, text);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[cfg(test)]
    pub fn children(&self, id: Option<usize>) -> impl Iterator<Item = &ParagraphNode> {
        self.nodes.iter().filter(move |node| node.parent == id)
    }

    pub fn into_nodes(self) -> Vec<ParagraphNode> {
        self.nodes
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BandMatch {
    /// The source carries no coordinate for this line.
    Unknown,
    Band(usize),
    Outside,
}

#[derive(Debug, Clone)]
struct OpenNode {
    id: usize,
    kind: ParagraphKind,
    depth: usize,
    band: Option<usize>,
    label: String,
}

#[derive(Debug, Clone)]
pub struct ArticleBody {
    pub intro: String,
    pub paragraphs: Vec<ParagraphNode>,
    pub issues: Vec<ExtractionIssue>,
    pub unbanded_lines: usize,
}

/// Builds one article's paragraph tree from its body lines using indentation
/// bands plus leading-token shape, with a stack of open nodes.
pub struct ParagraphBuilder<'a> {
    patterns: &'a LinePatterns,
    bands: &'a [IndentBand],
    policy: BandPolicy,
    article_id: String,
    intro: String,
    arena: ParagraphArena,
    stack: Vec<OpenNode>,
    last_written: Option<usize>,
    /// Band of `last_written`, when it had one.
    last_band: Option<usize>,
    /// Source lines are physical lines that may split a sentence.
    run_on: bool,
    issues: Vec<ExtractionIssue>,
    unbanded_lines: usize,
}

impl<'a> ParagraphBuilder<'a> {
    pub fn new(
        patterns: &'a LinePatterns,
        bands: &'a [IndentBand],
        policy: BandPolicy,
        article_id: &str,
        intro: &str,
    ) -> Self {
        Self {
            patterns,
            bands,
            policy,
            article_id: article_id.to_string(),
            intro: normalize_whitespace(intro),
            arena: ParagraphArena::default(),
            stack: Vec::new(),
            last_written: None,
            last_band: None,
            run_on: true,
            issues: Vec::new(),
            unbanded_lines: 0,
        }
    }

    /// Every token is a complete paragraph (DOCX `<w:p>`), so an unfinished
    /// sentence never runs on into the next token.
    pub fn paragraph_per_token(mut self) -> Self {
        self.run_on = false;
        self
    }

    pub fn push_line(&mut self, token: &Token) -> Result<()> {
        let band = self.band_of(token.left);
        let shape = self.resolve_ambiguity(self.patterns.leading_shape(&token.text));

        if band == BandMatch::Outside {
            self.unbanded_lines += 1;
            warn!(
                article = %self.article_id,
                page = token.page,
                left = token.left.unwrap_or_default(),
                "line outside every indentation band; attached as continuation"
            );
            if self.policy == BandPolicy::Strict {
                self.issues.push(ExtractionIssue {
                    kind: IssueKind::UnbandedLine,
                    message: format!(
                        "line at left {:.1} on page {} matches no indentation band: {}",
                        token.left.unwrap_or_default(),
                        token.page,
                        normalize_whitespace(&token.text)
                    ),
                });
            }
            let target = self.stack.len().checked_sub(1);
            return self.continuation(&normalize_whitespace(&token.text), target, band);
        }

        if shape.kind == ParagraphKind::Text {
            let target = match band {
                BandMatch::Band(line_band) => self
                    .stack
                    .iter()
                    .rposition(|node| node.band.map(|open| open <= line_band).unwrap_or(true)),
                _ => self.stack.len().checked_sub(1),
            };
            return self.continuation(&shape.body, target, band);
        }

        self.open_marker(shape, band)
    }

    fn open_marker(&mut self, shape: LeadingShape, band: BandMatch) -> Result<()> {
        let line_band = match band {
            BandMatch::Band(value) => Some(value),
            _ => None,
        };

        // De-indentation closes anything opened further right.
        if let Some(line_band) = line_band {
            while self
                .stack
                .last()
                .and_then(|node| node.band)
                .map(|open| open > line_band)
                .unwrap_or(false)
            {
                self.stack.pop();
            }
        }

        if let Some(position) = self.stack.iter().rposition(|node| {
            node.kind == shape.kind
                && match (node.band, line_band) {
                    (Some(open), Some(current)) => open == current,
                    _ => true,
                }
        }) {
            self.stack.truncate(position);
        }

        let parent = self.stack.last().map(|node| (node.id, node.depth));
        let depth = parent.map(|(_, depth)| depth + 1).unwrap_or(1);
        let id = self.arena.push(
            parent.map(|(id, _)| id),
            shape.kind,
            shape.label.clone(),
            normalize_whitespace(&shape.body),
            depth,
        )?;

        self.stack.push(OpenNode {
            id,
            kind: shape.kind,
            depth,
            band: line_band,
            label: shape.label,
        });
        self.last_written = Some(id);
        self.last_band = line_band;
        Ok(())
    }

    /// Continuation text attaches under the open node at stack index
    /// `target` (or at article level for `None`) at that node's depth.
    fn continuation(&mut self, text: &str, target: Option<usize>, band: BandMatch) -> Result<()> {
        let text = normalize_whitespace(text);
        if text.is_empty() {
            return Ok(());
        }

        // An unfinished sentence runs on into a line at the same or a deeper
        // band.
        if self.runs_on(band) {
            match self.last_written {
                Some(last) => {
                    let unfinished = self
                        .arena
                        .get(last)
                        .map(|node| !ends_sentence(&node.text))
                        .unwrap_or(false);
                    if unfinished {
                        self.arena.append_text(last, &text);
                        return Ok(());
                    }
                }
                None => {
                    if !ends_sentence(&self.intro) {
                        self.intro = join_text(&self.intro, &text);
                        return Ok(());
                    }
                }
            }
        }

        let line_band = match band {
            BandMatch::Band(value) => Some(value),
            _ => None,
        };

        let Some(index) = target else {
            self.stack.clear();
            let id = self
                .arena
                .push(None, ParagraphKind::Text, String::new(), text, 0)?;
            self.last_written = Some(id);
            self.last_band = line_band;
            return Ok(());
        };

        self.stack.truncate(index + 1);
        let Some(open) = self.stack.last().cloned() else {
            return Ok(());
        };

        let id = self
            .arena
            .push(Some(open.id), ParagraphKind::Text, String::new(), text, open.depth)?;
        self.last_written = Some(id);
        self.last_band = line_band;
        Ok(())
    }

    fn runs_on(&self, band: BandMatch) -> bool {
        if !self.run_on {
            return false;
        }
        match (band, self.last_band) {
            (BandMatch::Band(line), Some(open)) => line >= open,
            _ => true,
        }
    }

    /// A single letter that reads as a roman numeral (`C.`, `D.`, `I.`) is a
    /// heading-letter when it follows the open heading-letter sibling.
    fn resolve_ambiguity(&self, shape: LeadingShape) -> LeadingShape {
        if shape.kind != ParagraphKind::Fraction || shape.label.chars().count() != 1 {
            return shape;
        }

        let follows_heading_letter = self
            .stack
            .iter()
            .rev()
            .find(|node| node.kind == ParagraphKind::HeadingLetter)
            .and_then(|node| node.label.chars().next())
            .zip(shape.label.chars().next())
            .map(|(open, current)| (open as u32) + 1 == current as u32)
            .unwrap_or(false);

        let roman_continues = self
            .stack
            .iter()
            .rev()
            .find(|node| node.kind == ParagraphKind::Fraction)
            .and_then(|node| roman_value(&node.label))
            .zip(roman_value(&shape.label))
            .map(|(open, current)| open + 1 == current)
            .unwrap_or(false);

        if follows_heading_letter && !roman_continues {
            LeadingShape {
                kind: ParagraphKind::HeadingLetter,
                ..shape
            }
        } else {
            shape
        }
    }

    fn band_of(&self, left: Option<f64>) -> BandMatch {
        let Some(left) = left else {
            return BandMatch::Unknown;
        };
        if self.bands.is_empty() {
            return BandMatch::Unknown;
        }
        self.bands
            .iter()
            .position(|band| band.contains(left))
            .map(BandMatch::Band)
            .unwrap_or(BandMatch::Outside)
    }

    pub fn finish(self) -> ArticleBody {
        let mut issues = self.issues;
        if self.intro.is_empty() && self.arena.is_empty() {
            issues.push(ExtractionIssue {
                kind: IssueKind::EmptyBody,
                message: format!("article {} has no text", self.article_id),
            });
        }

        ArticleBody {
            intro: self.intro,
            paragraphs: self.arena.into_nodes(),
            issues,
            unbanded_lines: self.unbanded_lines,
        }
    }
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end()
        .chars()
        .last()
        .map(|ch| matches!(ch, '.' | ':' | ';'))
        .unwrap_or(false)
}

fn join_text(head: &str, tail: &str) -> String {
    if head.is_empty() {
        tail.to_string()
    } else if head.ends_with('-') && tail.chars().next().map(char::is_lowercase).unwrap_or(false) {
        format!("{}{}", head.trim_end_matches('-'), tail)
    } else {
        format!("{head} {tail}")
    }
}
