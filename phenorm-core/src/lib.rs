//! # phenorm-core — Normalização de Fenótipos para a HPO
//!
//! Este crate mapeia menções fenotípicas extraídas de notas clínicas para
//! identificadores da Human Phenotype Ontology (HPO) e avalia predições contra
//! um corpus anotado.
//!
//! ## Arquitetura do Sistema
//!
//! Os dados fluem dos carregadores para o matching e daí para a avaliação:
//!
//! 1.  **Modelo de dados** ([`term`], [`observation`], [`dataset`]): menções
//!     com spans de caracteres, agrupadas em observações e datasets.
//! 2.  **Ontologia** ([`hpo`], [`ontology_io`]): conceitos com rótulos,
//!     sinônimos e hierarquias; merge, subtração e filtros.
//! 3.  **Chaves de matching** ([`stemming`]): texto → chave stemmizada.
//! 4.  **Dicionários** ([`dictionary`]): chave → id HPO, com precedência
//!     explícita de rótulos preferidos sobre sinônimos.
//! 5.  **Matching** ([`matching`]): consulta em camadas do texto observado e
//!     do rótulo predito, com proveniência.
//! 6.  **Avaliação** ([`eval`]): TP/FP/FN, precisão/revocação/F1 e separação
//!     para análise de erros.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use phenorm_core::{Concept, Hpo, MatchingResources, ObservationDictionary, Term};
//!
//! // 1. Ontologia e dicionários são construídos uma única vez
//! let hpo = Hpo::from(vec![Concept::new("HP:0002094")
//!     .with_preferred_label("Dyspnea")
//!     .with_synonyms(vec!["Shortness of breath".to_string()])]);
//! let resources = MatchingResources::build(hpo, ObservationDictionary::new());
//! let matcher = resources.matcher();
//!
//! // 2. Um termo predito pelo modelo, com o trecho marcado no texto
//! let text = "Patient reports shortness of breath.";
//! let mut term = Term::from_tagged_text(
//!     "Breathing difficulty",
//!     "Patient reports [shortness of breath].",
//!     text,
//! )
//! .unwrap();
//!
//! // 3. O texto observado casa com um sinônimo da ontologia
//! matcher.normalize_term(&mut term);
//! assert_eq!(term.concept_id.as_deref(), Some("HP:0002094"));
//! ```

pub mod config;
pub mod corpus;
pub mod dataset;
pub mod dictionary;
pub mod error;
pub mod eval;
pub mod hpo;
pub mod matching;
pub mod observation;
pub mod ontology_io;
pub mod stemming;
pub mod term;

pub use config::{EvalOptions, LoadOptions, OntologySources, RowPolicy, StemOptions};
pub use dataset::Dataset;
pub use dictionary::{HpoDictionary, ObservationDictionary, ObservationTier};
pub use error::{Error, Result};
pub use eval::{compare, compare_streaming, split_by_outcome, Counts, ErrorSplit, EvalEvent, Scores};
pub use hpo::{Concept, Hpo};
pub use matching::{MatchResult, MatchSource, Matcher, MatchingResources, Provenance, TermMatcher};
pub use observation::Observation;
pub use term::{Span, Term};
