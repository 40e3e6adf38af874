//! # Termos e Spans
//!
//! Um [`Term`] representa **uma menção fenotípica** dentro do texto de uma
//! observação clínica: o conceito HPO atribuído, o rótulo preferido, a
//! polaridade (negação) e a lista de spans que apontam para o texto.
//!
//! ## Offsets
//!
//! Spans são intervalos semiabertos `[start, end)` medidos em **caracteres**
//! (não bytes) de `source_text`, serializados como `"start-end"` e separados
//! por vírgula quando há mais de um: `"0-5,12-20"`.
//!
//! ## Marcação com colchetes
//!
//! O texto de origem nunca contém `[` ou `]` (são trocados por parênteses na
//! construção). Assim a marcação abaixo é sempre reversível:
//!
//! ```rust
//! use phenorm_core::term::{Span, Term, untag};
//!
//! let term = Term::new(None, "fever", false, vec![Span::new(0, 5)], "Fever present");
//! assert_eq!(term.tagged_text(), "[Fever] present");
//! assert_eq!(untag(&term.tagged_text()), "Fever present");
//! ```

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::matching::Provenance;

/// Formato de um identificador HPO (ex: `HP:0002094`).
static CONCEPT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^HP:\d+$").unwrap());

/// Verifica se `id` segue o formato de identificador da ontologia.
pub fn is_valid_concept_id(id: &str) -> bool {
    CONCEPT_ID.is_match(id)
}

/// Intervalo semiaberto de caracteres `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Span {
    /// Offset do primeiro caractere (inclusivo)
    pub start: usize,
    /// Offset após o último caractere (exclusivo)
    pub end: usize,
}

impl Span {
    /// Cria um span sem validar a ordem; ver [`Span::try_new`].
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Cria um span exigindo `start <= end`.
    pub fn try_new(start: usize, end: usize) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidSpan(format!("{}-{}", start, end)));
        }
        Ok(Self { start, end })
    }

    /// `start <= end`. Spans invertidos tornam o termo inválido.
    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromStr for Span {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| Error::InvalidSpan(s.to_string()))?;
        let start: usize = start
            .trim()
            .parse()
            .map_err(|_| Error::InvalidSpan(s.to_string()))?;
        let end: usize = end
            .trim()
            .parse()
            .map_err(|_| Error::InvalidSpan(s.to_string()))?;
        Span::try_new(start, end).map_err(|_| Error::InvalidSpan(s.to_string()))
    }
}

impl TryFrom<String> for Span {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Span> for String {
    fn from(span: Span) -> Self {
        span.to_string()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Converte `"0-5,7-9"` em spans. Texto vazio produz lista vazia.
///
/// Falha com [`Error::InvalidSpan`] no primeiro span mal formado: spans são
/// estruturais e não há como recuperá-los.
pub fn parse_spans(s: &str) -> Result<Vec<Span>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(',').map(str::parse).collect()
}

/// Serializa spans no formato `"0-5,7-9"`.
pub fn format_spans(spans: &[Span]) -> String {
    spans
        .iter()
        .map(Span::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Troca colchetes por parênteses para manter a marcação inequívoca.
pub fn sanitize_text(text: &str) -> String {
    text.replace('[', "(").replace(']', ")")
}

/// Remove todos os `[` e `]` de um texto marcado.
pub fn untag(text: &str) -> String {
    text.chars().filter(|c| *c != '[' && *c != ']').collect()
}

/// Offset em bytes do caractere `char_idx`, limitado ao fim do texto.
fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(text.len())
}

pub(crate) fn deserialize_sanitized<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|s| sanitize_text(&s))
}

/// Uma menção fenotípica anotada ou predita.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    /// Identificador HPO; ausente enquanto o termo não foi normalizado.
    pub concept_id: Option<String>,
    /// Rótulo preferido (do corpus ou predito pelo modelo).
    pub preferred_label: String,
    /// `true` quando a menção está negada ("ausente").
    pub polarity: bool,
    pub spans: Vec<Span>,
    #[serde(deserialize_with = "deserialize_sanitized")]
    source_text: String,
    /// Qual camada do matching produziu o `concept_id`.
    #[serde(default)]
    pub provenance: Option<Provenance>,
}

impl Term {
    pub fn new(
        concept_id: Option<String>,
        preferred_label: impl Into<String>,
        polarity: bool,
        spans: Vec<Span>,
        source_text: &str,
    ) -> Self {
        Self {
            concept_id,
            preferred_label: preferred_label.into(),
            polarity,
            spans,
            source_text: sanitize_text(source_text),
            provenance: None,
        }
    }

    /// Constrói um termo a partir da codificação textual dos spans (`"0-5,7-9"`).
    pub fn with_span_text(
        concept_id: Option<String>,
        preferred_label: impl Into<String>,
        polarity: bool,
        spans: &str,
        source_text: &str,
    ) -> Result<Self> {
        let spans = parse_spans(spans)?;
        Ok(Self::new(concept_id, preferred_label, polarity, spans, source_text))
    }

    /// Recupera os spans de um texto marcado com colchetes pelo modelo.
    ///
    /// Cada par `[`…`]` anterior desloca o texto em 2 caracteres, então o
    /// i-ésimo par (base 0) corresponde a `(abre_i - 2i, fecha_i - (2i + 1))`.
    /// É o inverso exato de [`Term::tagged_text`].
    pub fn from_tagged_text(
        preferred_label: impl Into<String>,
        tagged: &str,
        source_text: &str,
    ) -> Result<Self> {
        let mut opens = Vec::new();
        let mut closes = Vec::new();
        for (i, c) in tagged.chars().enumerate() {
            match c {
                '[' => opens.push(i),
                ']' => closes.push(i),
                _ => {}
            }
        }
        if opens.len() != closes.len() {
            return Err(Error::UnevenTagging {
                text: tagged.to_string(),
                open: opens.len(),
                close: closes.len(),
            });
        }

        let mut spans = Vec::with_capacity(opens.len());
        for (i, (open, close)) in opens.into_iter().zip(closes).enumerate() {
            let start = open.checked_sub(2 * i);
            let end = close.checked_sub(2 * i + 1);
            match (start, end) {
                (Some(start), Some(end)) if start <= end => spans.push(Span { start, end }),
                _ => return Err(Error::InvalidSpan(format!("{}-{}", open, close))),
            }
        }
        Ok(Self::new(None, preferred_label, false, spans, source_text))
    }

    /// Texto da observação ao qual os spans se referem (sem colchetes).
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn preferred_label(&self) -> &str {
        &self.preferred_label
    }

    /// Spans como pares numéricos `(start, end)`.
    pub fn spans_as_pairs(&self) -> Vec<(usize, usize)> {
        self.spans.iter().map(|s| (s.start, s.end)).collect()
    }

    /// Spans serializados (`"0-5,7-9"`).
    pub fn span_text(&self) -> String {
        format_spans(&self.spans)
    }

    /// Um termo é uma predição válida quando tem id no formato da ontologia e
    /// ao menos um span, com o último terminando dentro do texto.
    pub fn is_valid(&self) -> bool {
        let id_valid = self
            .concept_id
            .as_deref()
            .map(is_valid_concept_id)
            .unwrap_or(false);
        let spans_valid = self
            .spans
            .last()
            .map(|last| last.end <= self.source_text.chars().count())
            .unwrap_or(false)
            && self.spans.iter().all(Span::is_ordered);
        id_valid && spans_valid
    }

    /// Retorna o texto de origem com cada span cercado por `[` e `]`.
    ///
    /// Os spans são aplicados na ordem original; como cada par inserido empurra
    /// o restante do texto 2 caracteres à direita, o n-ésimo span é deslocado
    /// em `2n` antes da inserção.
    pub fn tagged_text(&self) -> String {
        let mut chars: Vec<char> = self.source_text.chars().collect();
        for (n, span) in self.spans.iter().enumerate() {
            let offset = 2 * n;
            let end = (span.end + offset).min(chars.len());
            chars.insert(end, ']');
            let start = (span.start + offset).min(end);
            chars.insert(start, '[');
        }
        chars.into_iter().collect()
    }

    /// Concatena, separados por espaço, os trechos apontados por cada span.
    ///
    /// Spans invertidos são ignorados; offsets além do texto são limitados ao
    /// fim dele.
    pub fn observed_text(&self) -> String {
        self.spans
            .iter()
            .filter(|span| span.is_ordered())
            .map(|span| {
                let start = byte_offset(&self.source_text, span.start);
                let end = byte_offset(&self.source_text, span.end);
                &self.source_text[start..end]
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Linha tabular: `rótulo \t id \t spans` (ou só `id \t spans`).
    pub fn to_row(&self, extended: bool) -> String {
        let id = self.concept_id.as_deref().unwrap_or("NA");
        if extended {
            format!("{}\t{}\t{}", self.preferred_label, id, self.span_text())
        } else {
            format!("{}\t{}", id, self.span_text())
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_row(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fever() -> Term {
        Term::new(
            Some("HP:0001945".to_string()),
            "Fever",
            false,
            vec![Span::new(0, 5)],
            "Fever present",
        )
    }

    #[test]
    fn test_parse_spans() {
        let spans = parse_spans("0-5, 7-9").unwrap();
        assert_eq!(spans, vec![Span::new(0, 5), Span::new(7, 9)]);
        assert_eq!(format_spans(&spans), "0-5,7-9");
        assert!(parse_spans("").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_spans_fail() {
        assert!(matches!(parse_spans("0-5,7"), Err(Error::InvalidSpan(_))));
        assert!(matches!("a-b".parse::<Span>(), Err(Error::InvalidSpan(_))));
        assert!(matches!("9-3".parse::<Span>(), Err(Error::InvalidSpan(_))));
    }

    #[test]
    fn test_brackets_replaced_on_construction() {
        let term = Term::new(None, "x", false, vec![], "BP [high]");
        assert_eq!(term.source_text(), "BP (high)");
    }

    #[test]
    fn test_tagged_text_multiple_spans() {
        let term = Term::new(
            None,
            "shortness of breath",
            false,
            vec![Span::new(0, 9), Span::new(13, 19)],
            "shortness of breath",
        );
        // "shortness" e "breath" (13..19 no texto original)
        assert_eq!(term.tagged_text(), "[shortness] of [breath]");
        assert_eq!(term.observed_text(), "shortness breath");
    }

    #[test]
    fn test_observed_text_uses_char_offsets() {
        let term = Term::new(None, "x", false, vec![Span::new(2, 7)], "é édema");
        assert_eq!(term.observed_text(), "édema");
        assert_eq!(term.tagged_text(), "é [édema]");
    }

    #[test]
    fn test_reversed_span_is_harmless() {
        let reversed = Span::new(5, 2);
        assert_eq!(reversed.len(), 0);
        assert!(reversed.is_empty());
        assert!(!reversed.is_ordered());
        assert!(matches!(Span::try_new(5, 2), Err(Error::InvalidSpan(_))));

        let term = Term::new(
            Some("HP:0001945".to_string()),
            "Fever",
            false,
            vec![reversed, Span::new(6, 13)],
            "Fever present",
        );
        assert_eq!(term.observed_text(), "present");
        assert!(!term.is_valid());
        // A marcação não entra em pânico e continua reversível
        assert_eq!(untag(&term.tagged_text()), "Fever present");
    }

    #[test]
    fn test_from_tagged_text() {
        let term = Term::from_tagged_text("breath", "[shortness] of [breath]", "shortness of breath").unwrap();
        assert_eq!(term.spans, vec![Span::new(0, 9), Span::new(13, 19)]);
        assert_eq!(term.concept_id, None);
        assert!(!term.polarity);
    }

    #[test]
    fn test_from_tagged_text_uneven() {
        let err = Term::from_tagged_text("x", "[fever present", "fever present").unwrap_err();
        assert!(matches!(err, Error::UnevenTagging { open: 1, close: 0, .. }));
    }

    #[test]
    fn test_validity() {
        assert!(fever().is_valid());

        let mut no_id = fever();
        no_id.concept_id = None;
        assert!(!no_id.is_valid());

        let mut bad_id = fever();
        bad_id.concept_id = Some("NA".to_string());
        assert!(!bad_id.is_valid());

        let mut out_of_bounds = fever();
        out_of_bounds.spans = vec![Span::new(0, 50)];
        assert!(!out_of_bounds.is_valid());

        let mut no_spans = fever();
        no_spans.spans.clear();
        assert!(!no_spans.is_valid());
    }

    #[test]
    fn test_rows() {
        assert_eq!(fever().to_row(true), "Fever\tHP:0001945\t0-5");
        assert_eq!(fever().to_row(false), "HP:0001945\t0-5");
    }

    #[test]
    fn test_serde_spans_as_strings() {
        let json = serde_json::to_value(fever()).unwrap();
        assert_eq!(json["spans"], serde_json::json!(["0-5"]));

        let raw = r#"{"concept_id": null, "preferred_label": "x", "polarity": false,
                      "spans": ["0-3"], "source_text": "[a] b"}"#;
        let term: Term = serde_json::from_str(raw).unwrap();
        assert_eq!(term.source_text(), "(a) b");
        assert_eq!(term.spans, vec![Span::new(0, 3)]);
    }
}
