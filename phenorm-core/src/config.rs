//! # Configuração
//!
//! Estruturas de opções compartilhadas entre os módulos. Todas são
//! serializáveis para que o servidor web possa recebê-las em JSON.

use serde::{Deserialize, Serialize};

/// Flags do pré-processador de stemming ([`crate::stemming::stem`]).
///
/// A chave de um dicionário só é útil se for produzida e consultada com as
/// **mesmas** flags. Por isso o pipeline inteiro usa [`StemOptions::matching`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StemOptions {
    /// Converte tudo para minúsculas antes de tokenizar.
    pub lowercase: bool,
    /// Substitui sequências de pontuação por um espaço.
    pub strip_punctuation: bool,
    /// Remove palavras da lista de stop words.
    pub remove_stop_words: bool,
    /// Ordena os stems (chave independente da ordem das palavras).
    pub sort: bool,
}

impl StemOptions {
    /// Configuração usada na construção e na consulta dos dicionários.
    pub const fn matching() -> Self {
        Self {
            lowercase: true,
            strip_punctuation: true,
            remove_stop_words: true,
            sort: false,
        }
    }

    /// Apenas stemming, sem nenhuma limpeza adicional.
    pub const fn raw() -> Self {
        Self {
            lowercase: false,
            strip_punctuation: false,
            remove_stop_words: false,
            sort: false,
        }
    }
}

impl Default for StemOptions {
    fn default() -> Self {
        Self::matching()
    }
}

/// Critérios de comparação entre termo verdadeiro e termo predito.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalOptions {
    /// Compara o `concept_id` diretamente. Se `false`, o id predito é
    /// re-derivado pela função de matching antes da comparação.
    pub use_exact_id: bool,
    /// Exige spans idênticos. Se `false`, basta haver sobreposição.
    pub require_exact_span: bool,
    /// Ignora termos negados (polaridade marcada) nos dois lados.
    pub skip_polarity: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            use_exact_id: false,
            require_exact_span: true,
            skip_polarity: true,
        }
    }
}

/// O que fazer com uma linha mal formada durante a leitura de um corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// Registra um aviso e continua na próxima linha.
    #[default]
    Skip,
    /// Interrompe a leitura com [`crate::error::Error::MalformedRow`].
    Abort,
}

/// Opções do leitor de corpus TSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Descarta termos negados, mantendo apenas observações-chave.
    pub key_observations_only: bool,
    pub on_malformed: RowPolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            key_observations_only: true,
            on_malformed: RowPolicy::Skip,
        }
    }
}

/// Arquivos que compõem a ontologia final.
///
/// O primeiro arquivo JSON (ou TSV, na falta de JSON) inicializa a ontologia;
/// os demais são mesclados com [`crate::hpo::Hpo::merge`] e as exclusões
/// aplicadas por último com [`crate::hpo::Hpo::subtract`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OntologySources {
    /// Objetos `{id: {pref_term, synonyms}}`.
    pub json: Vec<String>,
    /// Exportação OBO Graph (`graphs[0].nodes`).
    pub obo_json: Vec<String>,
    /// Linhas `id \t rótulo`.
    pub tsv: Vec<String>,
    pub exclude_json: Vec<String>,
    pub exclude_tsv: Vec<String>,
}
