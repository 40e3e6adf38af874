//! # Tipos de Erro
//!
//! Erros recuperáveis do núcleo. Conflitos de dicionário, termos sem
//! correspondência e spans vazios na avaliação por sobreposição **não** são
//! erros: são registrados via `tracing` e seguem o fluxo normal.

use thiserror::Error;

/// Tipo `Result` usado em todo o crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Erros produzidos pelo núcleo de normalização e avaliação.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Span mal formado (ex: `"5"`, `"a-b"` ou `"9-3"`).
    #[error("span inválido: '{0}'")]
    InvalidSpan(String),

    /// Texto marcado com colchetes em número desigual de `[` e `]`.
    #[error("marcação desigual em '{text}': {open} '[' e {close} ']'")]
    UnevenTagging {
        text: String,
        open: usize,
        close: usize,
    },

    /// Dois datasets comparados posicionalmente com tamanhos diferentes.
    #[error("datasets desalinhados: {left} observações contra {right}")]
    LengthMismatch { left: usize, right: usize },

    /// Linha de TSV que não segue o esquema esperado.
    #[error("linha {line} mal formada: {reason}")]
    MalformedRow { line: usize, reason: String },

    /// Campo obrigatório ausente em um recurso JSON.
    #[error("campo ausente: {0}")]
    MissingField(String),

    #[error("erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("erro de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Cria um erro de linha mal formada.
    pub fn malformed_row(line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedRow {
            line,
            reason: reason.into(),
        }
    }
}
