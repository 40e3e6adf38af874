//! # Avaliação contra o Padrão-Ouro
//!
//! Compara um dataset predito com o dataset anotado, termo a termo e
//! observação a observação, e produz contagens TP/FP/FN e
//! precisão/revocação/F1 do corpus.
//!
//! ## Critérios de comparação ([`EvalOptions`])
//!
//! | Critério   | `true`                         | `false`                                   |
//! |------------|--------------------------------|-------------------------------------------|
//! | Identidade | `use_exact_id`: ids iguais     | id predito re-derivado pelo matcher       |
//! | Span       | `require_exact_span`: listas iguais | sobreposição entre o primeiro início e o último fim |
//!
//! Re-derivar o id permite pontuar a saída crua do modelo sem normalizá-la
//! antes.
//!
//! ## Contagem
//!
//! As duas direções são independentes (não é um emparelhamento bipartido):
//! - cada termo verdadeiro com **algum** predito compatível conta um TP,
//!   senão um FN;
//! - cada termo predito **válido** sem nenhum verdadeiro compatível conta um FP.
//!
//! Um termo predito pode, portanto, satisfazer mais de um termo verdadeiro.
//!
//! Se o total de TP do corpus é zero, precisão, revocação e F1 são definidos
//! como zero, independentemente de FP/FN.

use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::mpsc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::EvalOptions;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::matching::TermMatcher;
use crate::observation::Observation;
use crate::term::Term;

/// Contagens de verdadeiros positivos, falsos positivos e falsos negativos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl Counts {
    pub fn new(tp: usize, fp: usize, fn_: usize) -> Self {
        Self { tp, fp, fn_ }
    }

    /// Nenhum FP nem FN: a observação foi acertada por completo.
    pub fn is_perfect(&self) -> bool {
        self.fp == 0 && self.fn_ == 0
    }
}

impl Add for Counts {
    type Output = Counts;

    fn add(self, other: Counts) -> Counts {
        Counts {
            tp: self.tp + other.tp,
            fp: self.fp + other.fp,
            fn_: self.fn_ + other.fn_,
        }
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, other: Counts) {
        *self = *self + other;
    }
}

impl Sum for Counts {
    fn sum<I: Iterator<Item = Counts>>(iter: I) -> Self {
        iter.fold(Counts::default(), Add::add)
    }
}

/// Métricas do corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub counts: Counts,
}

impl Scores {
    /// Calcula as métricas; com `tp == 0` tudo é zero.
    pub fn from_counts(counts: Counts) -> Self {
        if counts.tp == 0 {
            return Scores {
                counts,
                ..Default::default()
            };
        }
        let tp = counts.tp as f64;
        let precision = tp / (tp + counts.fp as f64);
        let recall = tp / (tp + counts.fn_ as f64);
        let f1 = 2.0 * precision * recall / (precision + recall);
        Scores {
            precision,
            recall,
            f1,
            counts,
        }
    }
}

/// Eventos emitidos por [`compare_streaming`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EvalEvent {
    /// Um par de observações foi comparado.
    ObservationScored {
        index: usize,
        total: usize,
        observation_id: Option<String>,
        counts: Counts,
    },
    /// Resultado final do corpus.
    Done { scores: Scores },
    /// Falha irrecuperável (ex: datasets desalinhados).
    Error { message: String },
}

/// Datasets separados por resultado, para análise de erros.
///
/// Cada par é adicionado como duas observações consecutivas (verdadeira e
/// predita) contendo apenas os termos que **não** casaram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSplit {
    pub true_positives: Dataset,
    pub false_positives: Dataset,
    pub false_negatives: Dataset,
}

/// Compara um termo verdadeiro com um termo predito.
pub fn compare_terms<M: TermMatcher + ?Sized>(
    truth: &Term,
    pred: &Term,
    matcher: &M,
    options: &EvalOptions,
) -> bool {
    let id_match = if options.use_exact_id {
        truth.concept_id == pred.concept_id
    } else {
        matcher.match_term(pred).concept_id() == truth.concept_id.as_deref()
    };

    let span_match = if options.require_exact_span {
        truth.spans == pred.spans
    } else {
        spans_overlap(truth, pred)
    };

    id_match && span_match
}

/// Sobreposição entre `[primeiro início, último fim)` dos dois termos.
fn spans_overlap(truth: &Term, pred: &Term) -> bool {
    let (Some(pred_first), Some(pred_last)) = (pred.spans.first(), pred.spans.last()) else {
        error!("Span vazio no termo predito: {}", pred);
        return false;
    };
    let (Some(truth_first), Some(truth_last)) = (truth.spans.first(), truth.spans.last()) else {
        return false;
    };
    let end = truth_last.end.min(pred_last.end);
    let start = truth_first.start.max(pred_first.start);
    end.saturating_sub(start) > 0
}

/// Conta TP/FP/FN para um par de observações alinhadas.
pub fn compare_observations<M: TermMatcher + ?Sized>(
    truth: &Observation,
    pred: &Observation,
    matcher: &M,
    options: &EvalOptions,
) -> Counts {
    let mut counts = Counts::default();

    for t in truth.terms() {
        if options.skip_polarity && t.polarity {
            continue;
        }
        if pred.terms().iter().any(|p| compare_terms(t, p, matcher, options)) {
            counts.tp += 1;
        } else {
            counts.fn_ += 1;
        }
    }

    for p in pred.valid_terms() {
        if options.skip_polarity && p.polarity {
            continue;
        }
        if !truth.terms().iter().any(|t| compare_terms(t, p, matcher, options)) {
            counts.fp += 1;
        }
    }

    counts
}

fn check_aligned(truth: &Dataset, pred: &Dataset) -> Result<()> {
    if truth.len() != pred.len() {
        return Err(Error::LengthMismatch {
            left: truth.len(),
            right: pred.len(),
        });
    }
    Ok(())
}

/// Compara dois datasets alinhados por posição e calcula as métricas.
///
/// As observações são comparadas em paralelo; o resultado não depende da
/// ordem de avaliação.
pub fn compare<M: TermMatcher + ?Sized>(
    truth: &Dataset,
    pred: &Dataset,
    matcher: &M,
    options: &EvalOptions,
) -> Result<Scores> {
    check_aligned(truth, pred)?;

    let counts: Counts = truth
        .observations()
        .par_iter()
        .zip(pred.observations().par_iter())
        .map(|(t, p)| compare_observations(t, p, matcher, options))
        .reduce(Counts::default, Add::add);

    info!("TP: {}, FP: {}, FN: {}", counts.tp, counts.fp, counts.fn_);
    Ok(Scores::from_counts(counts))
}

/// Igual a [`compare`], mas sequencial e emitindo um [`EvalEvent`] por
/// observação, para acompanhar o progresso (ex: via WebSocket).
pub fn compare_streaming<M: TermMatcher + ?Sized>(
    truth: &Dataset,
    pred: &Dataset,
    matcher: &M,
    options: &EvalOptions,
    tx: mpsc::Sender<EvalEvent>,
) -> Result<Scores> {
    if let Err(e) = check_aligned(truth, pred) {
        let _ = tx.send(EvalEvent::Error {
            message: e.to_string(),
        });
        return Err(e);
    }

    let total = truth.len();
    let mut counts = Counts::default();
    for (index, (t, p)) in truth.iter().zip(pred.iter()).enumerate() {
        let obs_counts = compare_observations(t, p, matcher, options);
        counts += obs_counts;
        let _ = tx.send(EvalEvent::ObservationScored {
            index,
            total,
            observation_id: t.id.clone(),
            counts: obs_counts,
        });
    }

    info!("TP: {}, FP: {}, FN: {}", counts.tp, counts.fp, counts.fn_);
    let scores = Scores::from_counts(counts);
    let _ = tx.send(EvalEvent::Done { scores });
    Ok(scores)
}

/// Separa os pares de observações em TP, FP e FN para análise de erros.
///
/// Um par sem FP nem FN vai inteiro para `true_positives`. Caso contrário, vai
/// para `false_positives` se houver FP e para `false_negatives` se houver FN
/// (pode estar nos dois). As cópias mantêm apenas os termos sem
/// correspondência do outro lado; os originais não são alterados.
pub fn split_by_outcome<M: TermMatcher + ?Sized>(
    truth: &Dataset,
    pred: &Dataset,
    matcher: &M,
    options: &EvalOptions,
) -> Result<ErrorSplit> {
    check_aligned(truth, pred)?;

    let pairs: Vec<(Counts, Observation, Observation)> = truth
        .observations()
        .par_iter()
        .zip(pred.observations().par_iter())
        .map(|(t, p)| {
            let counts = compare_observations(t, p, matcher, options);
            let (residual_true, residual_pred) = residual_pair(t, p, matcher, options);
            (counts, residual_true, residual_pred)
        })
        .collect();

    let mut split = ErrorSplit::default();
    for (counts, residual_true, residual_pred) in pairs {
        if counts.is_perfect() {
            split.true_positives.add_observation(residual_true);
            split.true_positives.add_observation(residual_pred);
            continue;
        }
        if counts.fp > 0 {
            split.false_positives.add_observation(residual_true.clone());
            split.false_positives.add_observation(residual_pred.clone());
        }
        if counts.fn_ > 0 {
            split.false_negatives.add_observation(residual_true);
            split.false_negatives.add_observation(residual_pred);
        }
    }
    Ok(split)
}

/// Cópias das duas observações sem os termos que casaram com o outro lado.
fn residual_pair<M: TermMatcher + ?Sized>(
    truth: &Observation,
    pred: &Observation,
    matcher: &M,
    options: &EvalOptions,
) -> (Observation, Observation) {
    let unmatched_true: Vec<Term> = truth
        .terms()
        .iter()
        .filter(|t| !pred.terms().iter().any(|p| compare_terms(t, p, matcher, options)))
        .cloned()
        .collect();
    let unmatched_pred: Vec<Term> = pred
        .terms()
        .iter()
        .filter(|p| !truth.terms().iter().any(|t| compare_terms(t, p, matcher, options)))
        .cloned()
        .collect();

    let mut residual_true = truth.without_terms();
    residual_true.set_terms(unmatched_true);
    let mut residual_pred = pred.without_terms();
    residual_pred.set_terms(unmatched_pred);
    (residual_true, residual_pred)
}
