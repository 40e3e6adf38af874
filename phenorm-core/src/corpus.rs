//! # Leitura de Corpus
//!
//! Carregadores finos que produzem [`Dataset`]s a partir dos formatos usados
//! no corpus anotado. O núcleo (matching e avaliação) não depende deles.
//!
//! ## Formato anotado (TSV, 5 colunas)
//!
//! ```text
//! ObservationID  Text  HPOTerm  Polarity  Spans
//! 1              Eyes: Ptosis and myopia   HP:0000508     0-12
//! 1              Eyes: Ptosis and myopia   HP:0000545  X  17-23
//! 2              Skin: Normal              NA
//! ```
//!
//! - Linhas **consecutivas** com o mesmo id formam uma observação.
//! - `HPOTerm = NA` indica uma observação sem termos.
//! - `Polarity = X` marca a menção como negada.
//! - A localização anatômica é o texto antes do primeiro `:`.
//!
//! Linhas mal formadas seguem a política [`RowPolicy`] escolhida por quem
//! chama: registrar e pular, ou abortar.
//!
//! ## Respostas do modelo
//!
//! [`read_model_responses`] lê a saída do modelo de linguagem: uma tabela
//! markdown por observação em que cada menção aparece marcada com `[`…`]`.
//! Os spans são recuperados por [`Term::from_tagged_text`].

use std::io::{BufRead, Read};

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{LoadOptions, RowPolicy};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::hpo::Hpo;
use crate::observation::Observation;
use crate::term::{parse_spans, Term};

/// Marcador de polaridade negada na coluna `Polarity`.
pub const NEGATED_MARKER: &str = "X";

/// Valor de `HPOTerm` para observações sem termos.
pub const NO_TERM: &str = "NA";

/// Resposta do modelo quando não há nenhuma menção.
pub const EMPTY_RESPONSE: &str = "NA";

/// Cabeçalho da tabela markdown produzida pelo modelo.
pub const RESPONSE_TABLE_HEADER: &str =
    "| HPO Preferred Term | Marked Original Text |\n| ------------------ | -------------------- |";

/// Localização anatômica: prefixo do texto até o primeiro `:`.
pub fn body_location(text: &str) -> &str {
    text.split(':').next().unwrap_or(text)
}

/// Aplica a política de linhas mal formadas.
fn on_malformed(policy: RowPolicy, err: Error) -> Result<()> {
    match policy {
        RowPolicy::Skip => {
            warn!("Ignorando: {}", err);
            Ok(())
        }
        RowPolicy::Abort => Err(err),
    }
}

/// Linhas de dados (após o cabeçalho), numeradas a partir de 2.
fn data_lines<R: BufRead>(reader: R) -> impl Iterator<Item = (usize, std::io::Result<String>)> {
    reader
        .lines()
        .enumerate()
        .skip(1)
        .map(|(i, line)| (i + 1, line))
}

/// Lê o corpus anotado de 5 colunas.
///
/// O rótulo preferido de cada termo vem da ontologia, quando fornecida.
pub fn read_dataset_tsv<R: BufRead>(
    reader: R,
    hpo: Option<&Hpo>,
    options: &LoadOptions,
) -> Result<Dataset> {
    let mut dataset = Dataset::new();
    let mut current: Option<Observation> = None;

    for (line_no, line) in data_lines(reader) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        let [observation_id, text, concept_id, polarity, spans] = fields[..] else {
            on_malformed(
                options.on_malformed,
                Error::malformed_row(line_no, format!("esperadas 5 colunas, encontradas {}", fields.len())),
            )?;
            continue;
        };

        let is_new = current
            .as_ref()
            .map_or(true, |obs| obs.id.as_deref() != Some(observation_id));
        if is_new {
            if let Some(done) = current.take() {
                dataset.add_observation(done);
            }
            current = Some(Observation::new(
                Some(observation_id.to_string()),
                text,
                body_location(text),
            ));
        }

        if concept_id == NO_TERM {
            continue;
        }

        let spans = match parse_spans(spans) {
            Ok(spans) => spans,
            Err(e) => {
                on_malformed(options.on_malformed, Error::malformed_row(line_no, e.to_string()))?;
                continue;
            }
        };

        let negated = polarity == NEGATED_MARKER;
        if options.key_observations_only && negated {
            continue;
        }

        let label = preferred_label(hpo, concept_id);
        let term = Term::new(Some(concept_id.to_string()), label, negated, spans, text);
        if let Some(obs) = current.as_mut() {
            obs.add_term(term);
        }
    }

    if let Some(done) = current {
        dataset.add_observation(done);
    }

    info!("Corpus carregado: {} observações", dataset.len());
    Ok(dataset)
}

fn preferred_label(hpo: Option<&Hpo>, concept_id: &str) -> String {
    let Some(hpo) = hpo else {
        return String::new();
    };
    match hpo.get(concept_id).and_then(|c| c.get_preferred_label()) {
        Some(label) => label.to_string(),
        None => {
            warn!("Conceito {} ausente da ontologia", concept_id);
            String::new()
        }
    }
}

/// Lê observações sem anotações (`ObservationID \t Text`).
pub fn read_unlabeled_tsv<R: BufRead>(reader: R, options: &LoadOptions) -> Result<Dataset> {
    let mut dataset = Dataset::new();

    for (line_no, line) in data_lines(reader) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((observation_id, text)) if !text.contains('\t') => {
                dataset.add_observation(Observation::new(
                    Some(observation_id.to_string()),
                    text,
                    body_location(text),
                ));
            }
            _ => on_malformed(
                options.on_malformed,
                Error::malformed_row(line_no, "esperadas 2 colunas"),
            )?,
        }
    }

    Ok(dataset)
}

/// Lê a lista de ids selecionados à mão.
///
/// Cada linha tem um rótulo na primeira coluna seguido de ids; células com até
/// 3 caracteres são ignoradas (colunas vazias ou marcadores).
pub fn read_id_list<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for (_, line) in data_lines(reader) {
        let line = line?;
        ids.extend(
            line.split('\t')
                .skip(1)
                .filter(|cell| cell.len() > 3)
                .map(str::to_string),
        );
    }
    Ok(ids)
}

#[derive(Debug, Deserialize)]
struct ModelResponse {
    observation: String,
    response: String,
}

/// Converte uma resposta tabular do modelo em uma observação sem id.
///
/// Cada linha da tabela tem a forma `| rótulo | texto [marcado] |`.
pub fn parse_response_table(text: &str, response: &str, options: &LoadOptions) -> Result<Observation> {
    let mut observation = Observation::new(None, text, body_location(text));
    if response.trim() == EMPTY_RESPONSE {
        return Ok(observation);
    }

    let header_lines = RESPONSE_TABLE_HEADER.lines().count();
    for (i, row) in response.lines().enumerate().skip(header_lines) {
        if row.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = row.split('|').collect();
        let [_, label, tagged, _] = cells[..] else {
            on_malformed(
                options.on_malformed,
                Error::malformed_row(i + 1, format!("linha de tabela inválida: '{}'", row)),
            )?;
            continue;
        };

        match Term::from_tagged_text(label.trim(), tagged.trim(), text) {
            Ok(term) => observation.add_term(term),
            Err(e) => on_malformed(options.on_malformed, Error::malformed_row(i + 1, e.to_string()))?,
        }
    }
    Ok(observation)
}

/// Lê o JSON `[{"observation": ..., "response": ...}]` com as respostas do
/// modelo. Os termos resultantes não têm id; use
/// [`crate::matching::Matcher::normalize_dataset`] para atribuí-los.
pub fn read_model_responses<R: Read>(reader: R, options: &LoadOptions) -> Result<Dataset> {
    let responses: Vec<ModelResponse> = serde_json::from_reader(reader)?;
    responses
        .iter()
        .map(|item| parse_response_table(&item.observation, &item.response, options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hpo::Concept;

    const CORPUS: &str = "ObservationID\tText\tHPOTerm\tPolarity\tSpans
1\tEyes: Ptosis and myopia\tHP:0000508\t\t6-12
1\tEyes: Ptosis and myopia\tHP:0000545\tX\t17-23
2\tSkin: Normal\tNA\t\t
3\t\"Neck\": Goiter\tHP:0000853\t\t8-14
";

    fn ontology() -> Hpo {
        Hpo::from(vec![
            Concept::new("HP:0000508").with_preferred_label("Ptosis"),
            Concept::new("HP:0000545").with_preferred_label("Myopia"),
        ])
    }

    #[test]
    fn test_read_dataset_groups_rows() {
        let hpo = ontology();
        let dataset = read_dataset_tsv(CORPUS.as_bytes(), Some(&hpo), &LoadOptions::default()).unwrap();
        assert_eq!(dataset.len(), 3);

        let eyes = &dataset.observations()[0];
        assert_eq!(eyes.body_location, "Eyes");
        // O termo negado é descartado com key_observations_only
        assert_eq!(eyes.concept_ids(), vec!["HP:0000508"]);
        assert_eq!(eyes.terms()[0].preferred_label(), "Ptosis");
        assert_eq!(eyes.terms()[0].observed_text(), "Ptosis");

        assert!(!dataset.observations()[1].has_terms());
        assert_eq!(dataset.observations()[2].body_location, "Neck");
    }

    #[test]
    fn test_keep_negated_terms() {
        let options = LoadOptions {
            key_observations_only: false,
            ..LoadOptions::default()
        };
        let dataset = read_dataset_tsv(CORPUS.as_bytes(), None, &options).unwrap();
        let eyes = &dataset.observations()[0];
        assert_eq!(eyes.terms().len(), 2);
        assert!(eyes.terms()[1].polarity);
        assert_eq!(eyes.terms()[1].preferred_label(), "");
    }

    #[test]
    fn test_malformed_rows_follow_policy() {
        let corpus = "header\n1\tFever\tHP:0001945\t\t0-5\n2\tbroken row\n3\tCough\tHP:0012735\t\tx-y\n";

        let skipped = read_dataset_tsv(corpus.as_bytes(), None, &LoadOptions::default()).unwrap();
        assert_eq!(skipped.len(), 2);
        assert!(!skipped.observations()[1].has_terms());

        let abort = LoadOptions {
            on_malformed: RowPolicy::Abort,
            ..LoadOptions::default()
        };
        let err = read_dataset_tsv(corpus.as_bytes(), None, &abort).unwrap_err();
        assert!(matches!(err, Error::MalformedRow { line: 3, .. }));
    }

    #[test]
    fn test_read_unlabeled() {
        let input = "ObservationID\tText\na1\tEyes: Ptosis\na2\tSkin: Rash\n";
        let dataset = read_unlabeled_tsv(input.as_bytes(), &LoadOptions::default()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.observations()[1].id.as_deref(), Some("a2"));
        assert!(!dataset.observations()[0].has_terms());
    }

    #[test]
    fn test_read_id_list() {
        let input = "Group\tIds\nA\tobs-1\tobs-2\t\nB\tx\tobs-3\n";
        let ids = read_id_list(input.as_bytes()).unwrap();
        assert_eq!(ids, vec!["obs-1", "obs-2", "obs-3"]);
    }

    #[test]
    fn test_parse_response_table() {
        let text = "Eyes: Ptosis and myopia";
        let response = format!(
            "{}\n| Ptosis | Eyes: [Ptosis] and myopia |\n| Myopia | Eyes: Ptosis and [myopia] |",
            RESPONSE_TABLE_HEADER
        );
        let obs = parse_response_table(text, &response, &LoadOptions::default()).unwrap();
        assert_eq!(obs.terms().len(), 2);
        assert_eq!(obs.terms()[0].span_text(), "6-12");
        assert_eq!(obs.terms()[1].observed_text(), "myopia");
        assert!(obs.terms().iter().all(|t| t.concept_id.is_none()));
    }

    #[test]
    fn test_empty_and_uneven_responses() {
        let text = "Skin: Normal";
        let obs = parse_response_table(text, "NA", &LoadOptions::default()).unwrap();
        assert!(!obs.has_terms());

        let uneven = format!("{}\n| Rash | Skin: [Normal |", RESPONSE_TABLE_HEADER);
        let obs = parse_response_table(text, &uneven, &LoadOptions::default()).unwrap();
        assert!(!obs.has_terms());

        let abort = LoadOptions {
            on_malformed: RowPolicy::Abort,
            ..LoadOptions::default()
        };
        assert!(parse_response_table(text, &uneven, &abort).is_err());
    }

    #[test]
    fn test_read_model_responses() {
        let json = r#"[
            {"observation": "Eyes: Ptosis", "response": "NA"},
            {"observation": "Skin: Rash", "response": "| HPO Preferred Term | Marked Original Text |\n| ------------------ | -------------------- |\n| Rash | Skin: [Rash] |"}
        ]"#;
        let dataset = read_model_responses(json.as_bytes(), &LoadOptions::default()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.observations()[1].terms()[0].span_text(), "6-10");
    }
}
