//! # Dataset
//!
//! Coleção **ordenada** de observações. A ordem importa: datasets paralelos
//! (ouro vs. predito) são comparados por índice, não por id, a menos que os
//! ids tenham sido alinhados explicitamente com
//! [`Dataset::copy_observation_ids`].
//!
//! ## Formato de exportação
//!
//! [`Dataset::write_tsv`] produz o esquema de submissão:
//!
//! ```text
//! ObservationID \t Text \t HPO Term \t Spans
//! ```
//!
//! com uma linha por termo válido e uma linha `NA` para observações sem termos.

use std::collections::HashSet;
use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::observation::Observation;

/// Sequência ordenada de observações.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    observations: Vec<Observation>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn observations_mut(&mut self) -> &mut [Observation] {
        &mut self.observations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn add_observation(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    /// Concatena outro dataset ao final deste (ex: treino + validação).
    pub fn extend(&mut self, other: Dataset) {
        self.observations.extend(other.observations);
    }

    /// Índice da primeira observação com o id informado.
    pub fn observation_index(&self, id: &str) -> Option<usize> {
        let index = self
            .observations
            .iter()
            .position(|obs| obs.id.as_deref() == Some(id));
        if index.is_none() {
            warn!("Observação não encontrada: {}", id);
        }
        index
    }

    /// Todos os ids HPO do dataset, na ordem em que aparecem.
    pub fn concept_ids(&self) -> Vec<&str> {
        self.observations
            .iter()
            .flat_map(|obs| obs.concept_ids())
            .collect()
    }

    /// Mantém, em cada observação, apenas os termos com id em `ids`.
    pub fn retain_concept_ids<S: AsRef<str>>(&mut self, ids: &[S]) {
        for obs in &mut self.observations {
            obs.retain_concept_ids(ids);
        }
    }

    /// Remove, de cada observação, os termos com id em `ids`.
    pub fn remove_concept_ids<S: AsRef<str>>(&mut self, ids: &[S]) {
        for obs in &mut self.observations {
            obs.remove_concept_ids(ids);
        }
    }

    /// Novo dataset com as observações das localizações anatômicas dadas.
    pub fn filter_body_locations<S: AsRef<str>>(&self, locations: &[S]) -> Dataset {
        self.filtered(|obs| {
            locations
                .iter()
                .any(|loc| loc.as_ref() == obs.body_location)
        })
    }

    /// Novo dataset apenas com observações que possuem termos.
    pub fn filter_has_terms(&self) -> Dataset {
        self.filtered(Observation::has_terms)
    }

    /// Novo dataset apenas com observações sem termos.
    pub fn filter_no_terms(&self) -> Dataset {
        self.filtered(|obs| !obs.has_terms())
    }

    /// Subconjunto escolhido à mão, preservando a ordem deste dataset.
    pub fn select_ids<S: AsRef<str>>(&self, ids: &[S]) -> Dataset {
        let wanted: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
        self.filtered(|obs| obs.id.as_deref().map_or(false, |id| wanted.contains(id)))
    }

    fn filtered<F>(&self, keep: F) -> Dataset
    where
        F: Fn(&Observation) -> bool,
    {
        self.observations
            .iter()
            .filter(|obs| keep(*obs))
            .cloned()
            .collect()
    }

    /// Copia, posição a posição, os ids das observações de `other`.
    pub fn copy_observation_ids(&mut self, other: &Dataset) -> Result<()> {
        if self.len() != other.len() {
            return Err(Error::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        for (mine, theirs) in self.observations.iter_mut().zip(&other.observations) {
            mine.copy_id(theirs);
        }
        Ok(())
    }

    /// Renderização legível para inspeção.
    ///
    /// Se `body_locations` não for vazio, apenas essas localizações entram.
    pub fn render<S: AsRef<str>>(
        &self,
        include_terms: bool,
        include_headers: bool,
        body_locations: &[S],
    ) -> String {
        let mut out = String::new();
        if include_headers {
            out.push_str("ObservationID\tText");
            if include_terms {
                out.push_str("\tHPO Term\tPolarity\tSpans");
            }
            out.push('\n');
        }
        let selected = if body_locations.is_empty() {
            None
        } else {
            Some(self.filter_body_locations(body_locations))
        };
        let observations = selected.as_ref().unwrap_or(self).observations.iter();
        for obs in observations {
            out.push_str(&obs.render(include_terms));
        }
        out
    }

    /// Escreve o dataset no formato de submissão TSV.
    ///
    /// Termos inválidos que possuem id são reportados e omitidos. Se dois termos
    /// da mesma observação têm exatamente os mesmos spans, apenas o primeiro é
    /// escrito e o conflito é registrado.
    pub fn write_tsv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "ObservationID\tText\tHPO Term\tSpans")?;
        for obs in &self.observations {
            let id = obs.id.as_deref().unwrap_or("");
            let valid = obs.valid_terms();

            for term in obs.terms() {
                if term.concept_id.is_some() && !term.is_valid() {
                    warn!(
                        "Termo inválido na observação '{}': {}",
                        obs.text(),
                        term.preferred_label()
                    );
                }
            }

            if valid.is_empty() {
                writeln!(writer, "{}\t{}\tNA\tNA", id, obs.text())?;
                continue;
            }

            let mut written_spans: HashSet<String> = HashSet::new();
            for term in valid {
                let spans = term.span_text();
                if written_spans.contains(&spans) {
                    warn!(
                        "Múltiplos conceitos para o mesmo span na observação '{}'",
                        obs.text()
                    );
                    continue;
                }
                let concept = term.concept_id.as_deref().unwrap_or("NA");
                writeln!(writer, "{}\t{}\t{}\t{}", id, obs.text(), concept, spans)?;
                written_spans.insert(spans);
            }
        }
        Ok(())
    }

    /// Atalho de [`Dataset::write_tsv`] para uma `String`.
    pub fn to_tsv(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_tsv(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Io(std::io::Error::other(e)))
    }
}

impl From<Vec<Observation>> for Dataset {
    fn from(observations: Vec<Observation>) -> Self {
        Self { observations }
    }
}

impl FromIterator<Observation> for Dataset {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        Self {
            observations: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Dataset {
    type Item = Observation;
    type IntoIter = std::vec::IntoIter<Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.into_iter()
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render::<&str>(true, true, &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{Span, Term};

    fn obs(id: &str, text: &str, terms: &[(&str, usize, usize)]) -> Observation {
        let location = text.split(':').next().unwrap_or_default();
        let mut o = Observation::new(Some(id.to_string()), text, location);
        for (concept, start, end) in terms {
            o.add_term(Term::new(
                Some(concept.to_string()),
                *concept,
                false,
                vec![Span::new(*start, *end)],
                text,
            ));
        }
        o
    }

    fn dataset() -> Dataset {
        Dataset::from(vec![
            obs("1", "Eyes: ptosis", &[("HP:0000508", 6, 12)]),
            obs("2", "Skin: normal", &[]),
            obs("3", "Eyes: myopia and ptosis", &[("HP:0000545", 6, 12), ("HP:0000508", 17, 23)]),
        ])
    }

    #[test]
    fn test_filters() {
        let ds = dataset();
        assert_eq!(ds.filter_has_terms().len(), 2);
        assert_eq!(ds.filter_no_terms().len(), 1);
        assert_eq!(ds.filter_body_locations(&["Eyes"]).len(), 2);
        assert_eq!(ds.concept_ids(), vec!["HP:0000508", "HP:0000545", "HP:0000508"]);
        assert_eq!(ds.select_ids(&["3", "1"]).observations()[0].id.as_deref(), Some("1"));
    }

    #[test]
    fn test_concept_filters_in_place() {
        let mut ds = dataset();
        ds.retain_concept_ids(&["HP:0000508"]);
        assert_eq!(ds.concept_ids(), vec!["HP:0000508", "HP:0000508"]);

        let mut ds = dataset();
        ds.remove_concept_ids(&["HP:0000508"]);
        assert_eq!(ds.concept_ids(), vec!["HP:0000545"]);
    }

    #[test]
    fn test_observation_index() {
        let ds = dataset();
        assert_eq!(ds.observation_index("3"), Some(2));
        assert_eq!(ds.observation_index("99"), None);
    }

    #[test]
    fn test_copy_observation_ids() {
        let gold = dataset();
        let mut pred: Dataset = gold
            .iter()
            .map(|o| Observation::new(None, o.text(), &o.body_location))
            .collect();
        pred.copy_observation_ids(&gold).unwrap();
        assert_eq!(pred.observations()[1].id.as_deref(), Some("2"));

        let mut short = Dataset::from(vec![obs("x", "Eyes: a", &[])]);
        assert!(matches!(
            short.copy_observation_ids(&gold),
            Err(Error::LengthMismatch { left: 1, right: 3 })
        ));
    }

    #[test]
    fn test_write_tsv() {
        let mut ds = dataset();
        // Mesmo span com outro conceito: deve ser omitido
        let text = "Eyes: ptosis";
        ds.observations_mut()[0].add_term(Term::new(
            Some("HP:0001488".to_string()),
            "x",
            false,
            vec![Span::new(6, 12)],
            text,
        ));
        let tsv = ds.to_tsv().unwrap();
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines[0], "ObservationID\tText\tHPO Term\tSpans");
        assert_eq!(lines[1], "1\tEyes: ptosis\tHP:0000508\t6-12");
        assert_eq!(lines[2], "2\tSkin: normal\tNA\tNA");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_render_headers() {
        let ds = dataset();
        let rendered = ds.to_string();
        assert!(rendered.starts_with("ObservationID\tText\tHPO Term\tPolarity\tSpans\n"));
        assert_eq!(rendered.lines().count(), 5);

        let skin = ds.render(false, false, &["Skin"]);
        assert_eq!(skin, "2\tSkin: normal\n");
    }
}
