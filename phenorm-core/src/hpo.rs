//! # Ontologia HPO
//!
//! Mapeamento de identificador de conceito → [`Concept`]. A ontologia final é
//! montada a partir de vários arquivos:
//!
//! 1. **Merge** ([`Hpo::merge`]): une ontologias; um campo de um conceito já
//!    existente só é sobrescrito se o campo recebido **não for vazio**.
//! 2. **Subtração** ([`Hpo::subtract`]): remove conceitos por id (listas de
//!    exclusão, ex: termos obsoletos ou não observáveis).
//! 3. **Filtro hierárquico** ([`Hpo::filter_hierarchies`]): mantém apenas os
//!    conceitos cuja hierarquia contém uma das tags dadas (por substring).
//!
//! A ordem de inserção é preservada; ela define qual conceito "chega primeiro"
//! na construção do dicionário ([`crate::dictionary`]).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Um conceito da ontologia com seus rótulos.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Concept {
    pub id: String,
    pub preferred_label: Option<String>,
    pub preferred_labels: Vec<String>,
    pub synonyms: Vec<String>,
    /// Caminhos hierárquicos (ex: AUIs dos ancestrais).
    pub hierarchy_tags: Vec<String>,
}

impl Concept {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_preferred_label(mut self, label: impl Into<String>) -> Self {
        self.preferred_label = Some(label.into());
        self
    }

    pub fn with_preferred_labels(mut self, labels: Vec<String>) -> Self {
        self.preferred_labels = labels;
        self
    }

    pub fn with_synonyms(mut self, synonyms: Vec<String>) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_hierarchy_tags(mut self, tags: Vec<String>) -> Self {
        self.hierarchy_tags = tags;
        self
    }

    /// Rótulo preferido efetivo.
    ///
    /// Precedência: rótulo singular não vazio → primeiro de `preferred_labels`
    /// → primeiro sinônimo → nenhum.
    pub fn get_preferred_label(&self) -> Option<&str> {
        self.preferred_label
            .as_deref()
            .filter(|label| !label.is_empty())
            .or_else(|| self.preferred_labels.first().map(String::as_str))
            .or_else(|| self.synonyms.first().map(String::as_str))
    }

    /// Rótulo singular + rótulos preferidos + sinônimos, nessa ordem.
    pub fn all_labels(&self) -> Vec<&str> {
        self.preferred_label
            .as_deref()
            .filter(|label| !label.is_empty())
            .into_iter()
            .chain(self.preferred_labels.iter().map(String::as_str))
            .chain(self.synonyms.iter().map(String::as_str))
            .collect()
    }

    /// Sobrescreve cada campo de `self` pelo de `other`, se não vazio.
    fn absorb(&mut self, other: Concept) {
        if other.preferred_label.as_deref().map_or(false, |l| !l.is_empty()) {
            self.preferred_label = other.preferred_label;
        }
        if !other.preferred_labels.is_empty() {
            self.preferred_labels = other.preferred_labels;
        }
        if !other.synonyms.is_empty() {
            self.synonyms = other.synonyms;
        }
        if !other.hierarchy_tags.is_empty() {
            self.hierarchy_tags = other.hierarchy_tags;
        }
    }

    /// Linha TSV: `id \t termos` (simplificada) ou as quatro colunas.
    pub fn to_row(&self, simplified: bool) -> String {
        if simplified {
            let mut terms: Vec<&str> = Vec::new();
            for term in self.preferred_labels.iter().chain(&self.synonyms) {
                if !terms.contains(&term.as_str()) {
                    terms.push(term);
                }
            }
            format!("{}\t{}", self.id, terms.join("|"))
        } else {
            format!(
                "{}\t{}\t{}\t{}",
                self.id,
                self.preferred_labels.join("|"),
                self.synonyms.join("|"),
                self.hierarchy_tags.join("|")
            )
        }
    }
}

/// A ontologia: conceitos únicos por id, em ordem de inserção.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Concept>", into = "Vec<Concept>")]
pub struct Hpo {
    concepts: Vec<Concept>,
    index: HashMap<String, usize>,
}

impl Hpo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.concepts.iter().map(|c| c.id.as_str())
    }

    pub fn concepts(&self) -> &[Concept] {
        &self.concepts
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Concept> {
        self.index.get(id).map(|&i| &self.concepts[i])
    }

    /// Conceitos dos ids dados que existem na ontologia, na ordem pedida.
    pub fn get_many<S: AsRef<str>>(&self, ids: &[S]) -> Vec<&Concept> {
        ids.iter().filter_map(|id| self.get(id.as_ref())).collect()
    }

    /// Insere um conceito novo ou funde-o com o existente de mesmo id.
    pub fn add_concept(&mut self, concept: Concept) {
        match self.index.get(&concept.id) {
            Some(&i) => self.concepts[i].absorb(concept),
            None => {
                self.index.insert(concept.id.clone(), self.concepts.len());
                self.concepts.push(concept);
            }
        }
    }

    /// Incorpora todos os conceitos de `other` (ver [`Hpo::add_concept`]).
    pub fn merge(&mut self, other: Hpo) {
        for concept in other.concepts {
            self.add_concept(concept);
        }
    }

    /// Remove os conceitos cujos ids existem em `other` (o conteúdo é ignorado).
    pub fn subtract(&mut self, other: &Hpo) {
        self.concepts.retain(|c| !other.contains(&c.id));
        self.reindex();
    }

    /// Nova ontologia com os conceitos cuja hierarquia contém alguma das tags.
    pub fn filter_hierarchies<S: AsRef<str>>(&self, tags: &[S]) -> Hpo {
        self.concepts
            .iter()
            .filter(|concept| {
                concept
                    .hierarchy_tags
                    .iter()
                    .any(|path| tags.iter().any(|tag| path.contains(tag.as_ref())))
            })
            .cloned()
            .collect()
    }

    /// Primeiro conceito que tem `term` entre seus rótulos (sem diferenciar
    /// maiúsculas).
    pub fn find_concept_by_term(&self, term: &str) -> Option<&Concept> {
        let needle = term.to_lowercase();
        self.concepts.iter().find(|concept| {
            concept
                .all_labels()
                .iter()
                .any(|label| label.to_lowercase() == needle)
        })
    }

    /// Renderização TSV da ontologia inteira.
    pub fn render(&self, include_headers: bool, simplified: bool) -> String {
        let mut rows = Vec::with_capacity(self.len() + 1);
        if include_headers {
            rows.push(if simplified {
                "HPO ID\tTerms".to_string()
            } else {
                "HPO ID\tPreferred Terms\tSynonyms\tHierarchies".to_string()
            });
        }
        rows.extend(self.concepts.iter().map(|c| c.to_row(simplified)));
        rows.join("\n")
    }

    fn reindex(&mut self) {
        self.index = self
            .concepts
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
    }
}

impl FromIterator<Concept> for Hpo {
    fn from_iter<I: IntoIterator<Item = Concept>>(iter: I) -> Self {
        let mut hpo = Hpo::new();
        for concept in iter {
            hpo.add_concept(concept);
        }
        hpo
    }
}

impl From<Vec<Concept>> for Hpo {
    fn from(concepts: Vec<Concept>) -> Self {
        concepts.into_iter().collect()
    }
}

impl From<Hpo> for Vec<Concept> {
    fn from(hpo: Hpo) -> Self {
        hpo.concepts
    }
}

impl fmt::Display for Hpo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true, true))
    }
}
