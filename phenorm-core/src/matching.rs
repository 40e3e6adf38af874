//! # Pipeline de Matching
//!
//! Atribui um id HPO a um [`Term`] por consultas em camadas, parando na
//! primeira que encontrar algo:
//!
//! | Ordem | Texto consultado          | Dicionário                         |
//! |-------|---------------------------|------------------------------------|
//! | 1     | trecho observado (spans)  | [`HpoDictionary`]                  |
//! | 2     | trecho observado (spans)  | [`ObservationDictionary`] (resolution → observation) |
//! | 3     | rótulo predito pelo modelo| [`HpoDictionary`]                  |
//! | 4     | rótulo predito pelo modelo| [`ObservationDictionary`]          |
//!
//! O texto **observado** tem prioridade: o que está de fato escrito na nota
//! pesa mais do que o rótulo que o modelo sugeriu.
//!
//! Toda resposta carrega uma [`Provenance`] indicando a camada que casou, para
//! auditoria. Um id presente implica proveniência diferente de
//! [`Provenance::NoMatch`] e vice-versa.
//!
//! ## Recursos
//!
//! Ontologia e dicionários são construídos uma vez ([`MatchingResources`]) e
//! emprestados ao [`Matcher`]; não há estado global.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dataset::Dataset;
use crate::dictionary::{HpoDictionary, ObservationDictionary, ObservationTier};
use crate::hpo::Hpo;
use crate::stemming::stem_term;
use crate::term::Term;

/// Qual texto do termo foi consultado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// Trecho do texto apontado pelos spans.
    Observed,
    /// Rótulo preferido sugerido pelo modelo.
    Predicted,
}

impl MatchSource {
    fn name(&self) -> &'static str {
        match self {
            MatchSource::Observed => "Observed",
            MatchSource::Predicted => "Predicted",
        }
    }
}

/// Camada que produziu o id de um termo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    HpoDictionary {
        source: MatchSource,
    },
    ObservationDictionary {
        source: MatchSource,
        tier: ObservationTier,
    },
    NoMatch,
}

impl Provenance {
    /// Rótulo legível, ex: `"Observed term by HPO dictionary matching"`.
    pub fn label(&self) -> String {
        match self {
            Provenance::HpoDictionary { source } => {
                format!("{} term by HPO dictionary matching", source.name())
            }
            Provenance::ObservationDictionary { source, tier } => {
                let tier = match tier {
                    ObservationTier::Resolution => "resolution",
                    ObservationTier::Observation => "observation",
                };
                format!("{} term by Observation dictionary matching ({})", source.name(), tier)
            }
            Provenance::NoMatch => "No match".to_string(),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Resultado do matching de um termo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    concept_id: Option<String>,
    provenance: Provenance,
}

impl MatchResult {
    /// Correspondência encontrada. `provenance` não pode ser `NoMatch`.
    pub fn matched(concept_id: impl Into<String>, provenance: Provenance) -> Self {
        debug_assert!(provenance != Provenance::NoMatch);
        Self {
            concept_id: Some(concept_id.into()),
            provenance,
        }
    }

    pub fn no_match() -> Self {
        Self {
            concept_id: None,
            provenance: Provenance::NoMatch,
        }
    }

    pub fn concept_id(&self) -> Option<&str> {
        self.concept_id.as_deref()
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn into_parts(self) -> (Option<String>, Provenance) {
        (self.concept_id, self.provenance)
    }
}

/// Qualquer coisa capaz de derivar um id HPO a partir de um termo.
///
/// É o ponto de extensão consumido pela avaliação: [`Matcher`] implementa, e
/// qualquer closure `Fn(&Term) -> MatchResult` também.
pub trait TermMatcher: Sync {
    fn match_term(&self, term: &Term) -> MatchResult;
}

impl<F> TermMatcher for F
where
    F: Fn(&Term) -> MatchResult + Sync,
{
    fn match_term(&self, term: &Term) -> MatchResult {
        self(term)
    }
}

/// Ontologia e dicionários derivados, construídos uma única vez.
#[derive(Debug, Clone, Default)]
pub struct MatchingResources {
    pub hpo: Hpo,
    pub observations: ObservationDictionary,
    pub dictionary: HpoDictionary,
}

impl MatchingResources {
    pub fn build(hpo: Hpo, observations: ObservationDictionary) -> Self {
        let dictionary = HpoDictionary::build(&hpo, &observations);
        Self {
            hpo,
            observations,
            dictionary,
        }
    }

    pub fn matcher(&self) -> Matcher<'_> {
        Matcher::new(&self.dictionary, &self.observations)
    }
}

/// O matcher em camadas descrito no módulo.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'a> {
    dictionary: &'a HpoDictionary,
    observations: &'a ObservationDictionary,
}

impl<'a> Matcher<'a> {
    pub fn new(dictionary: &'a HpoDictionary, observations: &'a ObservationDictionary) -> Self {
        Self {
            dictionary,
            observations,
        }
    }

    /// Procura o id de um termo (ver tabela no topo do módulo).
    pub fn match_term(&self, term: &Term) -> MatchResult {
        let observed = term.observed_text();
        if !observed.is_empty() {
            if let Some(result) = self.lookup(&observed, MatchSource::Observed) {
                return result;
            }
        }

        if let Some(result) = self.lookup(term.preferred_label(), MatchSource::Predicted) {
            return result;
        }

        if !observed.is_empty() {
            warn!(
                "Termo sem correspondência: {} [{}]",
                term.preferred_label(),
                observed
            );
        }
        MatchResult::no_match()
    }

    /// Procura um texto avulso nos dois dicionários, sem proveniência.
    pub fn match_text(&self, text: &str) -> Option<String> {
        self.lookup(text, MatchSource::Observed)
            .and_then(|result| result.into_parts().0)
    }

    fn lookup(&self, text: &str, source: MatchSource) -> Option<MatchResult> {
        let key = stem_term(text);
        if key.is_empty() {
            return None;
        }
        if let Some(id) = self.dictionary.lookup(&key) {
            return Some(MatchResult::matched(id, Provenance::HpoDictionary { source }));
        }
        self.observations.lookup(&key).map(|(id, tier)| {
            MatchResult::matched(id, Provenance::ObservationDictionary { source, tier })
        })
    }

    /// Sobrescreve `concept_id` e `provenance` do termo com o resultado do matching.
    pub fn normalize_term(&self, term: &mut Term) {
        let (concept_id, provenance) = self.match_term(term).into_parts();
        term.concept_id = concept_id;
        term.provenance = Some(provenance);
    }

    /// Normaliza todos os termos do dataset, em paralelo por observação.
    pub fn normalize_dataset(&self, dataset: &mut Dataset) {
        dataset.observations_mut().par_iter_mut().for_each(|obs| {
            for term in obs.terms_mut() {
                self.normalize_term(term);
            }
        });
    }
}

impl TermMatcher for Matcher<'_> {
    fn match_term(&self, term: &Term) -> MatchResult {
        Matcher::match_term(self, term)
    }
}
