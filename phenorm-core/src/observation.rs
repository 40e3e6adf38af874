//! # Observação Clínica
//!
//! Uma [`Observation`] é uma unidade de texto (um trecho de nota clínica) que
//! possui, com exclusividade, a lista ordenada de [`Term`]s mencionados nela.
//! Todos os termos apontam para o mesmo texto da observação.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::term::{deserialize_sanitized, sanitize_text, Term};

/// Um trecho de texto clínico e suas menções fenotípicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Identificador do corpus; ausente em observações geradas pelo modelo.
    pub id: Option<String>,
    /// Categoria anatômica derivada do prefixo do texto (ex: `"Eyes"`).
    pub body_location: String,
    #[serde(deserialize_with = "deserialize_sanitized")]
    text: String,
    terms: Vec<Term>,
}

impl Observation {
    /// Cria uma observação sem termos.
    ///
    /// Colchetes no texto viram parênteses e aspas são removidas da
    /// localização anatômica.
    pub fn new(id: Option<String>, text: &str, body_location: &str) -> Self {
        Self {
            id,
            body_location: body_location.replace('"', ""),
            text: sanitize_text(text),
            terms: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Acesso mutável aos termos existentes (ex: normalização in-place).
    pub fn terms_mut(&mut self) -> &mut [Term] {
        &mut self.terms
    }

    pub fn add_term(&mut self, term: Term) {
        if term.source_text() != self.text {
            warn!(
                observation = self.id.as_deref().unwrap_or(""),
                "Termo '{}' aponta para um texto diferente da observação",
                term.preferred_label()
            );
        }
        self.terms.push(term);
    }

    /// Substitui a lista de termos inteira.
    pub fn set_terms(&mut self, terms: Vec<Term>) {
        self.terms = terms;
    }

    /// Cópia contendo apenas id, texto e localização (sem termos).
    pub fn without_terms(&self) -> Self {
        Self {
            id: self.id.clone(),
            body_location: self.body_location.clone(),
            text: self.text.clone(),
            terms: Vec::new(),
        }
    }

    pub fn has_terms(&self) -> bool {
        !self.terms.is_empty()
    }

    /// Ids HPO atribuídos aos termos (termos sem id são ignorados).
    pub fn concept_ids(&self) -> Vec<&str> {
        self.terms
            .iter()
            .filter_map(|t| t.concept_id.as_deref())
            .collect()
    }

    pub fn valid_terms(&self) -> Vec<&Term> {
        self.terms.iter().filter(|t| t.is_valid()).collect()
    }

    /// Mantém apenas os termos cujo id está em `ids`.
    ///
    /// Usado na análise de erros para restringir a validação aos conceitos
    /// vistos no treino.
    pub fn retain_concept_ids<S: AsRef<str>>(&mut self, ids: &[S]) {
        self.terms.retain(|t| has_listed_id(t, ids));
    }

    /// Remove os termos cujo id está em `ids`.
    pub fn remove_concept_ids<S: AsRef<str>>(&mut self, ids: &[S]) {
        self.terms.retain(|t| !has_listed_id(t, ids));
    }

    /// Copia o id de outra observação (alinhamento de datasets paralelos).
    pub fn copy_id(&mut self, other: &Observation) {
        self.id = other.id.clone();
    }

    /// Aplica `matcher` a cada palavra com mais de dois caracteres e coleta
    /// os ids encontrados, na ordem do texto.
    pub fn word_concept_matches<F>(&self, matcher: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.text
            .split(' ')
            .filter(|word| word.chars().count() > 2)
            .filter_map(matcher)
            .collect()
    }

    /// Renderização tabular, uma linha por termo.
    ///
    /// Sem termos, a linha leva `NA` nas colunas de termo. Com
    /// `include_terms = false`, apenas `id \t texto`.
    pub fn render(&self, include_terms: bool) -> String {
        let id = self.id.as_deref().unwrap_or("");
        if !include_terms {
            return format!("{}\t{}\n", id, self.text);
        }
        if self.terms.is_empty() {
            return format!("{}\t{}\tNA\tNA\tNA\n", id, self.text);
        }
        self.terms
            .iter()
            .map(|term| format!("{}\t{}\t{}\n", id, self.text, term.to_row(true)))
            .collect()
    }
}

fn has_listed_id<S: AsRef<str>>(term: &Term, ids: &[S]) -> bool {
    term.concept_id
        .as_deref()
        .map(|id| ids.iter().any(|listed| listed.as_ref() == id))
        .unwrap_or(false)
}
