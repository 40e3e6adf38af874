//! # Dicionários de Matching
//!
//! Dois recursos mapeiam **chaves stemmizadas** ([`crate::stemming::stem_term`])
//! para ids HPO:
//!
//! - [`HpoDictionary`]: construído a partir da ontologia.
//! - [`ObservationDictionary`]: recurso externo em duas camadas,
//!   `resolution` (sobrescritas autoritativas) e `observation` (mapeamentos
//!   mais brandos), com chaves já stemmizadas.
//!
//! ## Precedência na construção
//!
//! 1. Rótulos preferidos entram primeiro.
//! 2. Depois todos os rótulos (preferidos + sinônimos), pulando chaves que já
//!    vieram de um rótulo preferido.
//! 3. Em conflito (mesma chave, outro id) vale o **primeiro** que chegou.
//!    Um aviso é emitido, exceto quando a chave consta na camada
//!    `resolution`, que já documenta aquele conflito.
//!
//! Assim um rótulo canônico nunca perde para uma colisão acidental de sinônimo.

use std::collections::HashMap;
use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::hpo::Hpo;
use crate::stemming::stem_term;

/// Camada do dicionário de observações que produziu uma correspondência.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationTier {
    Resolution,
    Observation,
}

/// Recurso externo em duas camadas: chave stemmizada → id HPO.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationDictionary {
    pub resolution: HashMap<String, String>,
    pub observation: HashMap<String, String>,
}

impl ObservationDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lê o recurso JSON `{"resolution": {...}, "observation": {...}}`.
    pub fn from_json<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Procura uma chave já stemmizada: `resolution` primeiro, depois
    /// `observation`.
    pub fn lookup(&self, key: &str) -> Option<(&str, ObservationTier)> {
        self.resolution
            .get(key)
            .map(|id| (id.as_str(), ObservationTier::Resolution))
            .or_else(|| {
                self.observation
                    .get(key)
                    .map(|id| (id.as_str(), ObservationTier::Observation))
            })
    }

    /// Verdadeiro se a chave tem uma resolução explícita de conflito.
    pub fn is_resolved(&self, key: &str) -> bool {
        self.resolution.contains_key(key)
    }
}

/// Índice chave stemmizada → id HPO derivado da ontologia.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpoDictionary {
    entries: HashMap<String, String>,
}

impl HpoDictionary {
    /// Constrói o índice com a precedência descrita no módulo.
    pub fn build(hpo: &Hpo, observations: &ObservationDictionary) -> Self {
        debug!("Construindo dicionário HPO com {} conceitos", hpo.len());

        let mut preferred: HashMap<String, String> = HashMap::new();
        for concept in hpo.concepts() {
            let Some(label) = concept.get_preferred_label() else {
                continue;
            };
            insert_first_wins(&mut preferred, stem_term(label), &concept.id, observations, "rótulo preferido");
        }

        let mut synonyms: HashMap<String, String> = HashMap::new();
        for concept in hpo.concepts() {
            for label in concept.all_labels() {
                let key = stem_term(label);
                if preferred.contains_key(&key) {
                    continue;
                }
                insert_first_wins(&mut synonyms, key, &concept.id, observations, "sinônimo");
            }
        }

        for (key, id) in synonyms {
            preferred.entry(key).or_insert(id);
        }

        debug!("Dicionário HPO com {} chaves", preferred.len());
        Self { entries: preferred }
    }

    /// Procura uma chave já stemmizada.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Stemmiza `text` e procura a chave resultante.
    pub fn lookup_text(&self, text: &str) -> Option<&str> {
        self.lookup(&stem_term(text))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Insere `key → id` se a chave é nova; conflitos mantêm o primeiro valor.
fn insert_first_wins(
    map: &mut HashMap<String, String>,
    key: String,
    id: &str,
    observations: &ObservationDictionary,
    kind: &str,
) {
    match map.get(&key) {
        None => {
            map.insert(key, id.to_string());
        }
        Some(existing) if existing != id && !observations.is_resolved(&key) => {
            warn!(
                "Conflito de {} no dicionário: '{}' ({} e {})",
                kind, key, existing, id
            );
        }
        Some(_) => {}
    }
}
