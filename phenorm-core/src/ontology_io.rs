//! # Carregamento da Ontologia
//!
//! Leitores para os três formatos em que a HPO é distribuída, e a montagem
//! da ontologia final a partir de uma lista de arquivos ([`load_hpo`]).
//!
//! | Formato   | Conteúdo                                              |
//! |-----------|-------------------------------------------------------|
//! | TSV       | `id \t rótulo`, com cabeçalho                         |
//! | JSON      | `{"HP:...": {"pref_term": ..., "synonyms": [...]}}`   |
//! | OBO Graph | `graphs[0].nodes[]` com `id`, `lbl` e `meta.synonyms` |

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::config::OntologySources;
use crate::error::{Error, Result};
use crate::hpo::{Concept, Hpo};

/// Lê linhas `id \t rótulo`. Rótulos são convertidos para minúsculas e os
/// marcados como obsoletos são ignorados.
pub fn hpo_from_tsv<R: BufRead>(reader: R) -> Result<Hpo> {
    let mut hpo = Hpo::new();
    for (i, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (id, label) = line
            .split_once('\t')
            .ok_or_else(|| Error::malformed_row(i + 1, "esperado 'id \\t rótulo'"))?;
        let label = label.to_lowercase();
        if label.starts_with("obsolete") {
            continue;
        }
        hpo.add_concept(Concept::new(id).with_preferred_label(label));
    }
    Ok(hpo)
}

#[derive(Debug, Deserialize)]
struct JsonConcept {
    pref_term: Option<String>,
    #[serde(default)]
    synonyms: Vec<String>,
}

/// Lê o JSON `{id: {pref_term, synonyms?}}`.
///
/// Os conceitos entram em ordem de id, para que a construção do dicionário
/// seja reprodutível.
pub fn hpo_from_json<R: Read>(reader: R) -> Result<Hpo> {
    let raw: BTreeMap<String, JsonConcept> = serde_json::from_reader(reader)?;
    raw.into_iter()
        .map(|(id, value)| {
            let label = value
                .pref_term
                .ok_or_else(|| Error::MissingField(format!("{}.pref_term", id)))?;
            Ok(Concept::new(id)
                .with_preferred_label(label)
                .with_synonyms(value.synonyms))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OboGraphDocument {
    graphs: Vec<OboGraph>,
}

#[derive(Debug, Deserialize)]
struct OboGraph {
    #[serde(default)]
    nodes: Vec<OboNode>,
}

#[derive(Debug, Deserialize)]
struct OboNode {
    id: String,
    lbl: Option<String>,
    meta: Option<OboMeta>,
}

#[derive(Debug, Deserialize)]
struct OboMeta {
    #[serde(default)]
    synonyms: Vec<OboSynonym>,
}

#[derive(Debug, Deserialize)]
struct OboSynonym {
    val: String,
}

/// Converte a IRI de um nó (`http://purl.obolibrary.org/obo/HP_0000508`)
/// em `HP:0000508`.
fn obo_id(iri: &str) -> String {
    iri.rsplit('/').next().unwrap_or(iri).replace('_', ":")
}

/// Lê uma exportação OBO Graph (`hp.json`), mantendo apenas nós `HP:`.
pub fn hpo_from_obo_graph<R: Read>(reader: R) -> Result<Hpo> {
    let doc: OboGraphDocument = serde_json::from_reader(reader)?;
    let graph = doc
        .graphs
        .into_iter()
        .next()
        .ok_or_else(|| Error::MissingField("graphs[0]".to_string()))?;

    Ok(graph
        .nodes
        .into_iter()
        .filter_map(|node| {
            let id = obo_id(&node.id);
            if !id.starts_with("HP:") {
                return None;
            }
            let synonyms = node
                .meta
                .map(|meta| meta.synonyms.into_iter().map(|s| s.val).collect())
                .unwrap_or_default();
            let mut concept = Concept::new(id).with_synonyms(synonyms);
            concept.preferred_label = node.lbl;
            Some(concept)
        })
        .collect())
}

fn open(path: &str) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(Path::new(path))?))
}

/// Monta a ontologia final.
///
/// O primeiro arquivo (JSON, depois OBO Graph, depois TSV) inicializa; os
/// demais são mesclados e as listas de exclusão subtraídas no fim.
pub fn load_hpo(sources: &OntologySources) -> Result<Hpo> {
    let mut files: Vec<Hpo> = Vec::new();
    for path in &sources.json {
        files.push(hpo_from_json(open(path)?)?);
    }
    for path in &sources.obo_json {
        files.push(hpo_from_obo_graph(open(path)?)?);
    }
    for path in &sources.tsv {
        files.push(hpo_from_tsv(open(path)?)?);
    }

    let mut files = files.into_iter();
    let mut hpo = files.next().unwrap_or_default();
    info!("{} conceitos no arquivo inicial", hpo.len());
    for other in files {
        hpo.merge(other);
    }
    info!("{} conceitos no total", hpo.len());

    for path in &sources.exclude_json {
        hpo.subtract(&hpo_from_json(open(path)?)?);
    }
    for path in &sources.exclude_tsv {
        hpo.subtract(&hpo_from_tsv(open(path)?)?);
    }
    info!("{} conceitos após exclusões", hpo.len());

    Ok(hpo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsv_lowercases_and_skips_obsolete() {
        let tsv = "HPO ID\tTerm\nHP:0000508\tPtosis\nHP:0000001\tobsolete Thing\nHP:0000545\tMyopia\n";
        let hpo = hpo_from_tsv(tsv.as_bytes()).unwrap();
        assert_eq!(hpo.len(), 2);
        assert_eq!(hpo.get("HP:0000508").and_then(|c| c.get_preferred_label()), Some("ptosis"));
        assert!(!hpo.contains("HP:0000001"));
    }

    #[test]
    fn test_tsv_malformed_line() {
        let tsv = "HPO ID\tTerm\nHP:0000508 Ptosis\n";
        assert!(matches!(hpo_from_tsv(tsv.as_bytes()), Err(Error::MalformedRow { line: 2, .. })));
    }

    #[test]
    fn test_json() {
        let json = r#"{
            "HP:0002094": {"pref_term": "Dyspnea", "synonyms": ["Shortness of breath"]},
            "HP:0001945": {"pref_term": "Fever"}
        }"#;
        let hpo = hpo_from_json(json.as_bytes()).unwrap();
        assert_eq!(hpo.ids().collect::<Vec<_>>(), vec!["HP:0001945", "HP:0002094"]);
        assert_eq!(hpo.get("HP:0002094").unwrap().synonyms, vec!["Shortness of breath"]);

        let missing = r#"{"HP:1": {"synonyms": []}}"#;
        assert!(matches!(hpo_from_json(missing.as_bytes()), Err(Error::MissingField(_))));
    }

    #[test]
    fn test_obo_graph() {
        let json = r#"{"graphs": [{"nodes": [
            {"id": "http://purl.obolibrary.org/obo/HP_0000508", "lbl": "Ptosis",
             "meta": {"synonyms": [{"val": "Drooping eyelid"}, {"val": "Blepharoptosis"}]}},
            {"id": "http://purl.obolibrary.org/obo/HP_0000545", "lbl": "Myopia"},
            {"id": "http://purl.obolibrary.org/obo/GO_0008150", "lbl": "biological_process"}
        ]}]}"#;
        let hpo = hpo_from_obo_graph(json.as_bytes()).unwrap();
        assert_eq!(hpo.len(), 2);
        let ptosis = hpo.get("HP:0000508").unwrap();
        assert_eq!(ptosis.synonyms, vec!["Drooping eyelid", "Blepharoptosis"]);
        assert!(hpo.get("HP:0000545").unwrap().synonyms.is_empty());
    }

    #[test]
    fn test_load_hpo_without_files_is_empty() {
        let hpo = load_hpo(&OntologySources::default()).unwrap();
        assert!(hpo.is_empty());
    }

    #[test]
    fn test_load_hpo_merges_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("hpo.json");
        let tsv = dir.path().join("terms.tsv");
        let exclude = dir.path().join("exclude.tsv");
        std::fs::write(
            &json,
            r#"{"HP:0002094": {"pref_term": "Dyspnea", "synonyms": ["Shortness of breath"]}}"#,
        )
        .unwrap();
        std::fs::write(&tsv, "id\tlabel\nHP:0002094\tDyspnea\nHP:0001945\tFever\n").unwrap();
        std::fs::write(&exclude, "id\tlabel\nHP:0001945\tanything\n").unwrap();

        let path = |p: &std::path::PathBuf| p.to_string_lossy().into_owned();
        let sources = OntologySources {
            json: vec![path(&json)],
            tsv: vec![path(&tsv)],
            exclude_tsv: vec![path(&exclude)],
            ..OntologySources::default()
        };
        let hpo = load_hpo(&sources).unwrap();

        assert_eq!(hpo.len(), 1);
        let dyspnea = hpo.get("HP:0002094").unwrap();
        // O TSV sobrescreve o rótulo, mas não apaga os sinônimos do JSON
        assert_eq!(dyspnea.preferred_label.as_deref(), Some("dyspnea"));
        assert_eq!(dyspnea.synonyms, vec!["Shortness of breath"]);
    }

    #[test]
    fn test_load_hpo_missing_file() {
        let sources = OntologySources {
            tsv: vec!["/nonexistent/hpo.tsv".to_string()],
            ..OntologySources::default()
        };
        assert!(matches!(load_hpo(&sources), Err(Error::Io(_))));
    }
}
