//! # Pré-processador de Stemming
//!
//! Transforma um texto livre na **chave** usada pelos dicionários de matching.
//! A função é determinística e configurada por [`StemOptions`]:
//!
//! 1. **Pontuação** (`strip_punctuation`): cada sequência de pontuação vira um
//!    único espaço; o resultado é aparado.
//! 2. **Caixa** (`lowercase`): tudo em minúsculas.
//! 3. **Tokenização**: fronteiras de palavra Unicode (UAX #29).
//! 4. **Stop words** (`remove_stop_words`): remove palavras funcionais.
//! 5. **Stemming**: Snowball inglês em cada token, reaplicado até o radical
//!    parar de mudar (`early → earli → ear`); tokens que são só pontuação, e
//!    radicais que caem na lista de stop words, são descartados.
//! 6. **Junção** com espaço simples (ordenada, se `sort`).
//!
//! ## Exemplo
//!
//! ```rust
//! use phenorm_core::stemming::stem_term;
//!
//! assert_eq!(stem_term("Shortness of breath!"), "short breath");
//! ```

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::StemOptions;

/// Palavras funcionais frequentes em textos biomédicos.
const STOP_WORDS: &[&str] = &[
    "about", "again", "all", "almost", "also", "although", "always", "among", "an",
    "and", "another", "any", "are", "as", "at", "be", "because", "been", "before", "being", "between",
    "both", "but", "by", "can", "could", "did", "do", "does", "done", "due", "during", "each", "either",
    "enough", "especially", "etc", "for", "found", "from", "further", "had", "has", "have", "having",
    "here", "how", "however", "if", "in", "into", "is", "it", "its", "itself", "just", "kg", "km",
    "made", "mainly", "make", "may", "mg", "might", "ml", "mm", "most", "mostly", "must", "nearly",
    "neither", "no", "nor", "obtained", "of", "often", "on", "or", "our", "overall", "perhaps", "pmid",
    "quite", "rather", "really", "regarding", "seem", "seen", "several", "should", "show", "showed",
    "shown", "shows", "significantly", "since", "so", "some", "such", "than", "that", "the", "their",
    "theirs", "them", "then", "there", "therefore", "these", "they", "this", "those", "through", "thus",
    "to", "upon", "use", "used", "using", "various", "was", "we", "were", "what", "when", "which",
    "while", "with", "within", "would",
];

/// Pontuação tipográfica além do ASCII (aspas curvas, travessões, etc).
const EXTRA_PUNCTUATION: &str = "±–’«»‘‚‛′‵“”„‟‹›;··.〈〉‐‑‒—―−⁃";

static STOP_WORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOP_WORDS.iter().copied().collect());

static PUNCTUATION_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[-±+\t !@#$%^&*()_={}\[\]:;"'<>,.?/–«»‘’‚‛′‵“”„‟‹›;··〈〉‐‑‒—―−⁃]+"#).unwrap()
});

static ENGLISH: Lazy<Stemmer> = Lazy::new(|| Stemmer::create(Algorithm::English));

/// Limite de passadas do Snowball por token.
const MAX_STEM_PASSES: usize = 8;

/// Chave de matching: o mesmo conjunto de flags em todo lugar.
pub fn stem_term(text: &str) -> String {
    stem(text, StemOptions::matching())
}

/// Aplica o pré-processamento completo descrito no módulo.
pub fn stem(text: &str, options: StemOptions) -> String {
    let mut text = if options.strip_punctuation {
        PUNCTUATION_RUN.replace_all(text, " ").trim().to_string()
    } else {
        text.to_string()
    };

    if options.lowercase {
        text = text.to_lowercase();
    }

    let mut stems: Vec<String> = text
        .split_word_bounds()
        .filter(|token| !token.trim().is_empty())
        .filter(|token| !options.remove_stop_words || !is_stop_word(token, options.lowercase))
        .filter(|token| !is_punctuation(token))
        // O Snowball espera minúsculas
        .map(|token| stem_word(&token.to_lowercase()))
        .filter(|stem| !stem.is_empty())
        .filter(|stem| !options.remove_stop_words || !STOP_WORD_SET.contains(stem.as_str()))
        .collect();

    if options.sort {
        stems.sort();
    }

    stems.join(" ")
}

/// Radical de ponto fixo: uma única passada do Snowball nem sempre é
/// idempotente (`bilateral → bilater → bilat`).
fn stem_word(word: &str) -> String {
    let mut current = ENGLISH.stem(word).into_owned();
    for _ in 1..MAX_STEM_PASSES {
        let next = ENGLISH.stem(&current);
        if next == current {
            break;
        }
        current = next.into_owned();
    }
    current
}

fn is_stop_word(token: &str, already_lowercase: bool) -> bool {
    if already_lowercase {
        STOP_WORD_SET.contains(token)
    } else {
        STOP_WORD_SET.contains(token.to_lowercase().as_str())
    }
}

fn is_punctuation(token: &str) -> bool {
    token
        .chars()
        .all(|c| c.is_ascii_punctuation() || EXTRA_PUNCTUATION.contains(c))
}
