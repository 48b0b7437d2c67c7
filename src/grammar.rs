//! Article and rule identifier grammar.
//!
//! Identifiers are printed as `Artículo 4o-A.-`, `Artículo 29 Bis.`,
//! `Artículo 32-B Bis.-`, `Regla 2.1.1.` or, inside a transitional block,
//! `PRIMERO.-`. Parsing yields the structured parts plus a canonical display
//! string; anything left over after the recognized shape is an error so that
//! a mis-split header can never silently swallow article text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::model::fold_accents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrdinalMarker {
    O,
    A,
}

impl OrdinalMarker {
    pub fn as_str(self) -> &'static str {
        match self {
            OrdinalMarker::O => "o",
            OrdinalMarker::A => "a",
        }
    }

    fn from_char(ch: char) -> Option<Self> {
        match ch {
            'o' | 'º' | '°' => Some(OrdinalMarker::O),
            'a' | 'ª' => Some(OrdinalMarker::A),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatinOrdinal {
    Bis,
    Ter,
    Quater,
    Quinquies,
    Sexies,
    Septies,
    Octies,
    Nonies,
    Decies,
    Undecies,
    Duodecies,
    Terdecies,
    Quaterdecies,
    Quindecies,
    Sexiesdecies,
    Septiesdecies,
    Octiesdecies,
    Noniesdecies,
    Vicies,
}

impl LatinOrdinal {
    const ALL: [LatinOrdinal; 19] = [
        LatinOrdinal::Bis,
        LatinOrdinal::Ter,
        LatinOrdinal::Quater,
        LatinOrdinal::Quinquies,
        LatinOrdinal::Sexies,
        LatinOrdinal::Septies,
        LatinOrdinal::Octies,
        LatinOrdinal::Nonies,
        LatinOrdinal::Decies,
        LatinOrdinal::Undecies,
        LatinOrdinal::Duodecies,
        LatinOrdinal::Terdecies,
        LatinOrdinal::Quaterdecies,
        LatinOrdinal::Quindecies,
        LatinOrdinal::Sexiesdecies,
        LatinOrdinal::Septiesdecies,
        LatinOrdinal::Octiesdecies,
        LatinOrdinal::Noniesdecies,
        LatinOrdinal::Vicies,
    ];

    /// Position in the insertion sequence: Bis = 2, Ter = 3, ...
    pub fn rank(self) -> u8 {
        LatinOrdinal::ALL
            .iter()
            .position(|value| *value == self)
            .map(|index| index as u8 + 2)
            .unwrap_or(0)
    }

    pub fn display(self) -> &'static str {
        match self {
            LatinOrdinal::Bis => "Bis",
            LatinOrdinal::Ter => "Ter",
            LatinOrdinal::Quater => "Quáter",
            LatinOrdinal::Quinquies => "Quinquies",
            LatinOrdinal::Sexies => "Sexies",
            LatinOrdinal::Septies => "Septies",
            LatinOrdinal::Octies => "Octies",
            LatinOrdinal::Nonies => "Nonies",
            LatinOrdinal::Decies => "Decies",
            LatinOrdinal::Undecies => "Undecies",
            LatinOrdinal::Duodecies => "Duodecies",
            LatinOrdinal::Terdecies => "Terdecies",
            LatinOrdinal::Quaterdecies => "Quáterdecies",
            LatinOrdinal::Quindecies => "Quindecies",
            LatinOrdinal::Sexiesdecies => "Sexiesdecies",
            LatinOrdinal::Septiesdecies => "Septiesdecies",
            LatinOrdinal::Octiesdecies => "Octiesdecies",
            LatinOrdinal::Noniesdecies => "Noniesdecies",
            LatinOrdinal::Vicies => "Vicies",
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        let folded = fold_accents(word).to_ascii_lowercase();
        let value = match folded.as_str() {
            "bis" => LatinOrdinal::Bis,
            "ter" => LatinOrdinal::Ter,
            "quater" => LatinOrdinal::Quater,
            "quinquies" | "quintus" => LatinOrdinal::Quinquies,
            "sexies" => LatinOrdinal::Sexies,
            "septies" => LatinOrdinal::Septies,
            "octies" => LatinOrdinal::Octies,
            "nonies" | "novies" => LatinOrdinal::Nonies,
            "decies" => LatinOrdinal::Decies,
            "undecies" => LatinOrdinal::Undecies,
            "duodecies" => LatinOrdinal::Duodecies,
            "terdecies" => LatinOrdinal::Terdecies,
            "quaterdecies" => LatinOrdinal::Quaterdecies,
            "quindecies" => LatinOrdinal::Quindecies,
            "sexiesdecies" | "sexdecies" => LatinOrdinal::Sexiesdecies,
            "septiesdecies" | "septdecies" => LatinOrdinal::Septiesdecies,
            "octiesdecies" | "octodecies" => LatinOrdinal::Octiesdecies,
            "noniesdecies" | "novodecies" => LatinOrdinal::Noniesdecies,
            "vicies" => LatinOrdinal::Vicies,
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleNumber {
    pub base: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub: Vec<u32>,
    pub ordinal: Option<OrdinalMarker>,
    pub letter_suffix: Option<String>,
    pub latin_suffix: Option<LatinOrdinal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    pub display: String,
}

/// Ordering key: `(base, sub, letter, latin rank)`. The raw string never
/// takes part, so `2` < `2 Bis` < `2-A` < `3`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArticleKey {
    pub base: u32,
    pub sub: Vec<u32>,
    pub letter: Option<String>,
    pub latin_rank: u8,
}

impl ArticleNumber {
    pub fn key(&self) -> ArticleKey {
        ArticleKey {
            base: self.base,
            sub: self.sub.clone(),
            letter: self.letter_suffix.clone(),
            latin_rank: self.latin_suffix.map(LatinOrdinal::rank).unwrap_or(0),
        }
    }

    fn render(&self) -> String {
        let mut out = match &self.word {
            Some(word) => word.clone(),
            None => {
                let mut value = self.base.to_string();
                for part in &self.sub {
                    value.push('.');
                    value.push_str(&part.to_string());
                }
                if let Some(ordinal) = self.ordinal {
                    value.push_str(ordinal.as_str());
                }
                value
            }
        };

        if let Some(letter) = &self.letter_suffix {
            out.push('-');
            out.push_str(letter);
        }
        if let Some(latin) = self.latin_suffix {
            out.push(' ');
            out.push_str(latin.display());
        }
        out
    }
}

impl fmt::Display for ArticleNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

pub fn parse(raw: &str) -> Result<ArticleNumber, PipelineError> {
    let fail = |reason: String| PipelineError::GrammarError {
        raw: raw.to_string(),
        reason,
    };

    let spaced = raw.replace('_', " ");
    let body = trim_terminators(strip_prefix_word(spaced.trim()));
    if body.is_empty() {
        return Err(fail("missing article number".to_string()));
    }

    let chars = body.chars().collect::<Vec<char>>();
    let mut index = 0usize;

    let mut number = ArticleNumber {
        base: 0,
        sub: Vec::new(),
        ordinal: None,
        letter_suffix: None,
        latin_suffix: None,
        word: None,
        display: String::new(),
    };

    if chars[0].is_ascii_digit() {
        number.base = take_digits(&chars, &mut index)
            .ok_or_else(|| fail("article number out of range".to_string()))?;

        while index + 1 < chars.len() && chars[index] == '.' && chars[index + 1].is_ascii_digit() {
            index += 1;
            let part = take_digits(&chars, &mut index)
                .ok_or_else(|| fail("rule number segment out of range".to_string()))?;
            number.sub.push(part);
        }

        if index < chars.len() {
            if let Some(ordinal) = OrdinalMarker::from_char(chars[index]) {
                let followed_by_letter = chars
                    .get(index + 1)
                    .map(|next| next.is_alphabetic())
                    .unwrap_or(false);
                if !followed_by_letter {
                    number.ordinal = Some(ordinal);
                    index += 1;
                }
            }
        }
    } else {
        let (word, value, consumed) = take_spelled_ordinal(&chars[index..])
            .ok_or_else(|| fail(format!("unrecognized number {:?}", body)))?;
        number.base = value;
        number.word = Some(word);
        index += consumed;
    }

    skip_separators(&chars, &mut index);

    if index < chars.len() && chars[index].is_alphabetic() {
        let single = chars
            .get(index + 1)
            .map(|next| !next.is_alphabetic())
            .unwrap_or(true);
        if single && chars[index].is_ascii_alphabetic() {
            number.letter_suffix = Some(chars[index].to_ascii_uppercase().to_string());
            index += 1;
            skip_separators(&chars, &mut index);
        }
    }

    if index < chars.len() {
        let start = index;
        while index < chars.len() && chars[index].is_alphabetic() {
            index += 1;
        }
        let word = chars[start..index].iter().collect::<String>();
        match LatinOrdinal::from_word(&word) {
            Some(latin) => number.latin_suffix = Some(latin),
            None => {
                let rest = chars[start..].iter().collect::<String>();
                return Err(fail(format!("unmatched trailing text {:?}", rest)));
            }
        }
    }

    if index < chars.len() {
        let rest = chars[index..].iter().collect::<String>();
        return Err(fail(format!("unmatched trailing text {:?}", rest)));
    }

    number.display = number.render();
    Ok(number)
}

pub fn canonicalize(raw: &str) -> Result<String, PipelineError> {
    parse(raw).map(|number| number.display)
}

/// Numeric value of a division number printed as digits, a roman numeral or
/// a Spanish ordinal word (`PRIMERO`, `DÉCIMO SEGUNDO`, `ÚNICO`).
pub fn division_number_value(raw: &str) -> Option<u32> {
    let trimmed = raw.trim().trim_end_matches(['.', '-', ':']);
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return trimmed.parse::<u32>().ok();
    }
    if let Some(value) = roman_value(trimmed) {
        return Some(value);
    }
    spanish_ordinal_value(trimmed)
}

pub fn roman_value(raw: &str) -> Option<u32> {
    if raw.is_empty() || raw.len() > 12 {
        return None;
    }

    let upper = raw.to_ascii_uppercase();
    let mut total = 0u32;
    let mut previous = 0u32;
    for ch in upper.chars().rev() {
        let value = match ch {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            'L' => 50,
            'C' => 100,
            'D' => 500,
            'M' => 1000,
            _ => return None,
        };
        if value < previous {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            previous = value;
        }
    }

    // Reject non-canonical spellings such as IIII or VX.
    if to_roman(total) == upper {
        Some(total)
    } else {
        None
    }
}

pub fn to_roman(mut value: u32) -> String {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];

    let mut out = String::new();
    for (amount, symbol) in TABLE {
        while value >= amount {
            out.push_str(symbol);
            value -= amount;
        }
    }
    out
}

pub fn spanish_ordinal_value(raw: &str) -> Option<u32> {
    let folded = fold_accents(raw)
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<String>();
    if folded.is_empty() {
        return None;
    }
    if folded == "unico" || folded == "unica" {
        return Some(1);
    }

    let (tens, rest) = match TENS.iter().find(|(word, _)| folded.starts_with(word)) {
        Some((word, value)) => (*value, &folded[word.len()..]),
        None => (0, folded.as_str()),
    };
    // "decimo" is also the standalone ordinal for ten.
    if rest.is_empty() {
        return if tens > 0 { Some(tens) } else { None };
    }

    let unit = UNITS
        .iter()
        .find(|(word, _)| *word == rest)
        .map(|(_, value)| *value)?;
    Some(tens + unit)
}

const UNITS: [(&str, u32); 18] = [
    ("primero", 1),
    ("primera", 1),
    ("segundo", 2),
    ("segunda", 2),
    ("tercero", 3),
    ("tercera", 3),
    ("cuarto", 4),
    ("cuarta", 4),
    ("quinto", 5),
    ("quinta", 5),
    ("sexto", 6),
    ("sexta", 6),
    ("septimo", 7),
    ("septima", 7),
    ("octavo", 8),
    ("octava", 8),
    ("noveno", 9),
    ("novena", 9),
];

const TENS: [(&str, u32); 8] = [
    ("decimo", 10),
    ("decima", 10),
    ("vigesimo", 20),
    ("vigesima", 20),
    ("trigesimo", 30),
    ("trigesima", 30),
    ("cuadragesimo", 40),
    ("cuadragesima", 40),
];

fn strip_prefix_word(input: &str) -> &str {
    let folded = fold_accents(input).to_ascii_lowercase();
    for prefix in ["articulo", "art.", "regla"] {
        if folded.starts_with(prefix) {
            // Folding is one char per char, so the prefix spans the same
            // number of chars in the original.
            let byte_offset = input
                .char_indices()
                .nth(prefix.chars().count())
                .map(|(offset, _)| offset)
                .unwrap_or(input.len());
            let rest = &input[byte_offset..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) || prefix.ends_with('.') {
                return rest.trim_start();
            }
        }
    }
    input
}

fn trim_terminators(input: &str) -> &str {
    input.trim_end_matches(|ch: char| matches!(ch, '.' | '-' | '–' | '—' | ':') || ch.is_whitespace())
}

fn take_digits(chars: &[char], index: &mut usize) -> Option<u32> {
    let start = *index;
    while *index < chars.len() && chars[*index].is_ascii_digit() {
        *index += 1;
    }
    chars[start..*index].iter().collect::<String>().parse::<u32>().ok()
}

fn skip_separators(chars: &[char], index: &mut usize) {
    while *index < chars.len() && matches!(chars[*index], ' ' | '-' | '–' | '_' | '\u{a0}') {
        *index += 1;
    }
}

/// Longest run of leading words that still reads as a Spanish ordinal.
fn take_spelled_ordinal(chars: &[char]) -> Option<(String, u32, usize)> {
    let mut words = Vec::<(usize, usize)>::new();
    let mut index = 0usize;
    while index < chars.len() && words.len() < 2 {
        let start = index;
        while index < chars.len() && chars[index].is_alphabetic() {
            index += 1;
        }
        if index == start {
            break;
        }
        words.push((start, index));
        while index < chars.len() && chars[index] == ' ' {
            index += 1;
        }
    }

    for count in (1..=words.len()).rev() {
        let (start, _) = words[0];
        let (_, end) = words[count - 1];
        let text = chars[start..end].iter().collect::<String>();
        if let Some(value) = spanish_ordinal_value(&text) {
            return Some((title_case(&text), value, end));
        }
    }
    None
}

fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
